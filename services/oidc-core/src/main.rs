//! xoidc-migrate - 初始化数据库结构并检查存储健康状态

use std::sync::Arc;

use tracing::info;
use xoidc_adapter_postgres::{Migration, MigrationManager, PostgresConfig, create_pool};
use xoidc_common::RequestContext;
use xoidc_config::AppConfig;
use xoidc_core::OidcEngine;
use xoidc_core::infrastructure::persistence::PostgresUnitOfWorkFactory;

const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "init", include_str!("../migrations/0001_init.sql"))];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config_dir = std::env::var("XOIDC_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_dir)?;

    xoidc_telemetry::init(&config.telemetry.log_level, config.telemetry.json);
    xoidc_telemetry::init_metrics()?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Starting migration"
    );

    let pool = create_pool(&PostgresConfig::from(&config.database)).await?;
    info!(
        "PostgreSQL connection pool created (max_connections: {})",
        config.database.max_connections
    );

    let migrations: Vec<Migration> = MIGRATIONS
        .iter()
        .map(|(version, name, sql)| Migration::new(*version, *name, *sql))
        .collect();
    let result = MigrationManager::new(pool.clone()).migrate(&migrations).await?;
    info!(applied = result.applied_count(), "Migrations finished");

    let engine = OidcEngine::new(Arc::new(PostgresUnitOfWorkFactory::new(pool)), &config)?;
    engine.health(&RequestContext::new()).await?;
    info!(id = %engine.next_id(), "Storage healthy");

    Ok(())
}
