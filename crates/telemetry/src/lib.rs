//! telemetry - 可观测性库

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use xoidc_errors::{AppError, AppResult};

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 按配置选择输出格式
pub fn init(log_level: &str, json: bool) {
    if json {
        init_tracing_json(log_level);
    } else {
        init_tracing(log_level);
    }
}

/// 初始化 Prometheus metrics
pub fn init_metrics() -> AppResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    describe_metrics();
    Ok(handle)
}

/// 注册核心指标的说明
pub fn describe_metrics() {
    metrics::describe_counter!("oidc_tokens_issued_total", "Tokens issued, labelled by kind");
    metrics::describe_counter!(
        "oidc_refresh_rotations_total",
        "Refresh tokens rotated successfully"
    );
    metrics::describe_counter!(
        "oidc_refresh_replays_total",
        "Refresh grants presenting an unknown or rotated-out token"
    );
    metrics::describe_counter!("oidc_tokens_revoked_total", "Tokens revoked, labelled by kind");
    metrics::describe_counter!(
        "oidc_login_attempts_total",
        "Interactive login attempts, labelled by result"
    );
    metrics::describe_counter!(
        "oidc_device_authorizations_total",
        "Device authorization transitions, labelled by outcome"
    );
}
