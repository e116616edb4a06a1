//! 凭证校验
//!
//! 用户密码与 client secret 共用同一套 Argon2id 摘要。

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use xoidc_config::PasswordHashConfig;
use xoidc_errors::{AppError, AppResult};

/// 凭证校验能力
pub trait CredentialVerifier: Send + Sync {
    /// 生成 PHC 格式摘要
    fn hash(&self, secret: &str) -> AppResult<String>;

    /// 校验明文与摘要是否匹配。摘要格式错误时返回 `Err`
    fn verify(&self, secret: &str, digest: &str) -> AppResult<bool>;

    /// 用户不存在时用于对齐耗时的摘要
    fn dummy_digest(&self) -> &str;
}

/// Argon2id 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt_len: usize,
    pub key_len: usize,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
            salt_len: 16,
            key_len: 32,
        }
    }
}

impl From<&PasswordHashConfig> for Argon2Params {
    fn from(config: &PasswordHashConfig) -> Self {
        Self {
            memory_kib: config.memory_kib,
            iterations: config.iterations,
            parallelism: config.parallelism,
            salt_len: config.salt_len,
            key_len: config.key_len,
        }
    }
}

/// Argon2id 实现
pub struct Argon2CredentialVerifier {
    hasher: Argon2<'static>,
    salt_len: usize,
    dummy: String,
}

impl Argon2CredentialVerifier {
    pub fn new(params: Argon2Params) -> AppResult<Self> {
        let argon2_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(params.key_len),
        )
        .map_err(|e| AppError::internal(format!("Invalid argon2 params: {}", e)))?;

        let mut verifier = Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params),
            salt_len: params.salt_len,
            dummy: String::new(),
        };
        verifier.dummy = verifier.hash("xoidc-dummy-secret")?;
        Ok(verifier)
    }

    fn generate_salt(&self) -> AppResult<SaltString> {
        let mut bytes = vec![0u8; self.salt_len];
        rand::thread_rng().fill_bytes(&mut bytes);
        SaltString::encode_b64(&bytes).map_err(|e| AppError::internal(format!("Invalid salt: {}", e)))
    }
}

impl CredentialVerifier for Argon2CredentialVerifier {
    fn hash(&self, secret: &str) -> AppResult<String> {
        let salt = self.generate_salt()?;
        let digest = self
            .hasher
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))?;
        Ok(digest.to_string())
    }

    fn verify(&self, secret: &str, digest: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| AppError::internal(format!("Invalid password hash: {}", e)))?;

        // 参数取自摘要本身
        Ok(self
            .hasher
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }

    fn dummy_digest(&self) -> &str {
        &self.dummy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2CredentialVerifier {
        Argon2CredentialVerifier::new(Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let verifier = cheap();
        let digest = verifier.hash("s3cret").unwrap();

        assert!(digest.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(verifier.verify("s3cret", &digest).unwrap());
        assert!(!verifier.verify("wrong", &digest).unwrap());
    }

    #[test]
    fn test_salt_differs() {
        let verifier = cheap();
        let a = verifier.hash("same").unwrap();
        let b = verifier.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_digest() {
        let verifier = cheap();
        assert!(verifier.verify("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_dummy_digest_never_matches_empty() {
        let verifier = cheap();
        assert!(!verifier.verify("", verifier.dummy_digest()).unwrap());
    }

    #[test]
    fn test_default_params() {
        let params = Argon2Params::default();
        assert_eq!(params.memory_kib, 19456);
        assert_eq!(params.iterations, 2);
        assert_eq!(params.parallelism, 1);
        assert_eq!(params.salt_len, 16);
        assert_eq!(params.key_len, 32);
        assert_eq!(Argon2Params::from(&PasswordHashConfig::default()), params);
    }
}
