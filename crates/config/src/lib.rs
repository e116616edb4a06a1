//! xoidc-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 令牌与授权请求有效期（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_auth_request_ttl")]
    pub auth_request_ttl_secs: u64,
    #[serde(default = "default_auth_code_ttl")]
    pub auth_code_ttl_secs: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: default_access_token_ttl(),
            refresh_token_ttl_secs: default_refresh_token_ttl(),
            auth_request_ttl_secs: default_auth_request_ttl(),
            auth_code_ttl_secs: default_auth_code_ttl(),
        }
    }
}

fn default_access_token_ttl() -> u64 {
    300
}

fn default_refresh_token_ttl() -> u64 {
    18000
}

fn default_auth_request_ttl() -> u64 {
    1800
}

fn default_auth_code_ttl() -> u64 {
    600
}

/// Argon2id 参数
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordHashConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_salt_len")]
    pub salt_len: usize,
    #[serde(default = "default_key_len")]
    pub key_len: usize,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            salt_len: default_salt_len(),
            key_len: default_key_len(),
        }
    }
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

fn default_salt_len() -> usize {
    16
}

fn default_key_len() -> usize {
    32
}

/// Snowflake 配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnowflakeConfig {
    #[serde(default)]
    pub instance_id: u16,
}

/// 自定义 scope / claim 名称
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimsConfig {
    #[serde(default = "default_custom_scope")]
    pub custom_scope: String,
    #[serde(default = "default_custom_claim")]
    pub custom_claim: String,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            custom_scope: default_custom_scope(),
            custom_claim: default_custom_claim(),
        }
    }
}

fn default_custom_scope() -> String {
    "custom_scope".to_string()
}

fn default_custom_claim() -> String {
    "custom_claim".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub password_hash: PasswordHashConfig,
    #[serde(default)]
    pub snowflake: SnowflakeConfig,
    #[serde(default)]
    pub claims: ClaimsConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 优先级：`XOIDC_` 环境变量 > `{APP_ENV}.toml` > `default.toml`
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Self::figment(config_dir, &env).extract()?;
        config.validate()?;

        Ok(config)
    }

    fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("XOIDC_").split("__"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.snowflake.instance_id > 1023 {
            return Err(ConfigError::Invalid(format!(
                "snowflake.instance_id {} out of range 0..=1023",
                self.snowflake.instance_id
            )));
        }
        if self.tokens.access_token_ttl_secs == 0 || self.tokens.refresh_token_ttl_secs == 0 {
            return Err(ConfigError::Invalid("token ttl must be positive".to_string()));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;
