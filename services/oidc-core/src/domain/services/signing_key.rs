//! 签名密钥
//!
//! 核心只透传当前签名密钥与验证密钥集合，令牌签名由端点层完成。

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use xoidc_errors::{AppError, AppResult};

/// 当前签名密钥
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub key: EncodingKey,
}

/// 公开的验证密钥
#[derive(Clone)]
pub struct VerificationKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

pub trait SigningKeyProvider: Send + Sync {
    fn signing_key(&self) -> &SigningKey;

    fn signature_algorithms(&self) -> Vec<Algorithm>;

    fn key_set(&self) -> Vec<VerificationKey>;
}

/// 单密钥、不轮换
pub struct StaticKeyProvider {
    signing: SigningKey,
    verification: VerificationKey,
}

impl StaticKeyProvider {
    /// HS256 共享密钥，仅用于开发与测试
    pub fn hmac(key_id: impl Into<String>, secret: &[u8]) -> Self {
        let key_id = key_id.into();
        Self {
            signing: SigningKey {
                key_id: key_id.clone(),
                algorithm: Algorithm::HS256,
                key: EncodingKey::from_secret(secret),
            },
            verification: VerificationKey {
                key_id,
                algorithm: Algorithm::HS256,
                key: DecodingKey::from_secret(secret),
            },
        }
    }

    /// RS256 PEM 密钥对
    pub fn rsa_pem(
        key_id: impl Into<String>,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> AppResult<Self> {
        let key_id = key_id.into();
        let signing = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AppError::internal(format!("Invalid RSA private key: {}", e)))?;
        let verification = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AppError::internal(format!("Invalid RSA public key: {}", e)))?;

        Ok(Self {
            signing: SigningKey {
                key_id: key_id.clone(),
                algorithm: Algorithm::RS256,
                key: signing,
            },
            verification: VerificationKey {
                key_id,
                algorithm: Algorithm::RS256,
                key: verification,
            },
        })
    }
}

impl SigningKeyProvider for StaticKeyProvider {
    fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    fn signature_algorithms(&self) -> Vec<Algorithm> {
        vec![self.signing.algorithm]
    }

    fn key_set(&self) -> Vec<VerificationKey> {
        vec![self.verification.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Header, Validation, decode, encode};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Claims {
        sub: String,
        exp: usize,
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let provider = StaticKeyProvider::hmac("k1", b"test-secret");
        let signing = provider.signing_key();

        let mut header = Header::new(signing.algorithm);
        header.kid = Some(signing.key_id.clone());
        let claims = Claims {
            sub: "user-1".into(),
            exp: 4_102_444_800,
        };
        let token = encode(&header, &claims, &signing.key).unwrap();

        let keys = provider.key_set();
        assert_eq!(keys.len(), 1);
        let verified = decode::<Claims>(&token, &keys[0].key, &Validation::new(keys[0].algorithm))
            .unwrap();
        assert_eq!(verified.claims, claims);
        assert_eq!(verified.header.kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_rejects_bad_pem() {
        assert!(StaticKeyProvider::rsa_pem("k", b"garbage", b"garbage").is_err());
        let provider = StaticKeyProvider::hmac("k", b"s");
        assert_eq!(provider.signature_algorithms(), vec![Algorithm::HS256]);
    }
}
