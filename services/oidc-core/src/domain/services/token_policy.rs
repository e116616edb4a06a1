//! 有效期策略

use chrono::Duration;
use xoidc_config::TokensConfig;

/// 令牌、授权请求与授权码的有效期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub auth_request_ttl: Duration,
    pub auth_code_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::minutes(5),
            refresh_token_ttl: Duration::hours(5),
            auth_request_ttl: Duration::minutes(30),
            auth_code_ttl: Duration::minutes(10),
        }
    }
}

impl From<&TokensConfig> for TokenPolicy {
    fn from(config: &TokensConfig) -> Self {
        let secs = |v: u64| {
            i64::try_from(v)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX)
        };
        Self {
            access_token_ttl: secs(config.access_token_ttl_secs),
            refresh_token_ttl: secs(config.refresh_token_ttl_secs),
            auth_request_ttl: secs(config.auth_request_ttl_secs),
            auth_code_ttl: secs(config.auth_code_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        assert_eq!(TokenPolicy::from(&TokensConfig::default()), TokenPolicy::default());
    }
}
