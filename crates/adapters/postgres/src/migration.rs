//! 版本化 SQL 迁移
//!
//! 迁移脚本随二进制一起编译，按版本号升序应用。每个已应用的版本在
//! `xoidc_schema_migrations` 中记录 SHA-256，脚本被改动后拒绝启动。

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use xoidc_errors::{AppError, AppResult};

const MIGRATIONS_TABLE: &str = "xoidc_schema_migrations";

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = hex_sha256(&sql);
        Self {
            version,
            name: name.into(),
            sql,
            checksum,
        }
    }
}

fn hex_sha256(sql: &str) -> String {
    Sha256::digest(sql.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MigrationResult {
    pub applied: Vec<i64>,
    pub skipped: Vec<i64>,
}

impl MigrationResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// 对比已记录的校验和，返回待应用的迁移（按版本升序）
fn plan<'a>(
    migrations: &'a [Migration],
    recorded: &HashMap<i64, String>,
    result: &mut MigrationResult,
) -> AppResult<Vec<&'a Migration>> {
    let mut sorted: Vec<_> = migrations.iter().collect();
    sorted.sort_by_key(|m| m.version);

    let mut pending = Vec::new();
    for migration in sorted {
        match recorded.get(&migration.version) {
            Some(checksum) if checksum != &migration.checksum => {
                warn!(version = migration.version, "Migration checksum mismatch");
                return Err(AppError::internal(format!(
                    "Migration {} ({}) has been modified after it was applied",
                    migration.version, migration.name
                )));
            }
            Some(_) => result.skipped.push(migration.version),
            None => pending.push(migration),
        }
    }
    Ok(pending)
}

pub struct MigrationManager {
    pool: PgPool,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 应用全部待处理迁移，每个版本一个事务，失败即停止
    pub async fn migrate(&self, migrations: &[Migration]) -> AppResult<MigrationResult> {
        self.ensure_table().await?;

        let recorded = self.recorded_checksums().await?;
        let mut result = MigrationResult::default();

        for migration in plan(migrations, &recorded, &mut result)? {
            self.apply(migration).await?;
            result.applied.push(migration.version);
        }

        debug!(skipped = result.skipped.len(), "Migrations up to date");
        Ok(result)
    }

    async fn ensure_table(&self) -> AppResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                version BIGINT PRIMARY KEY, \
                name TEXT NOT NULL, \
                checksum CHAR(64) NOT NULL, \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            MIGRATIONS_TABLE
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to create migration table: {}", e)))?;
        Ok(())
    }

    async fn recorded_checksums(&self) -> AppResult<HashMap<i64, String>> {
        let sql = format!("SELECT version, checksum FROM {}", MIGRATIONS_TABLE);
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to read migrations: {}", e)))?;
        Ok(rows.into_iter().collect())
    }

    async fn apply(&self, migration: &Migration) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!(
                    "Failed to apply migration {}: {}",
                    migration.version, e
                ))
            })?;

        let sql = format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            MIGRATIONS_TABLE
        );
        sqlx::query(&sql)
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to record migration: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit migration: {}", e)))?;

        info!(version = migration.version, name = %migration.name, "Migration applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_sha256_hex() {
        let m = Migration::new(1, "init", "CREATE TABLE t (id INT)");
        assert_eq!(m.checksum.len(), 64);
        assert!(m.checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(m.checksum, Migration::new(1, "init", "CREATE TABLE u (id INT)").checksum);
    }

    #[test]
    fn test_plan_orders_and_skips() {
        let migrations = vec![
            Migration::new(2, "tokens", "CREATE TABLE b (id INT)"),
            Migration::new(1, "init", "CREATE TABLE a (id INT)"),
            Migration::new(3, "devices", "CREATE TABLE c (id INT)"),
        ];
        let recorded = HashMap::from([(1, migrations[1].checksum.clone())]);

        let mut result = MigrationResult::default();
        let pending = plan(&migrations, &recorded, &mut result).unwrap();

        let versions: Vec<_> = pending.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![2, 3]);
        assert_eq!(result.skipped, vec![1]);
    }

    #[test]
    fn test_plan_rejects_modified_migration() {
        let migrations = vec![Migration::new(1, "init", "CREATE TABLE a (id BIGINT)")];
        let recorded = HashMap::from([(1, hex_sha256("CREATE TABLE a (id INT)"))]);

        let mut result = MigrationResult::default();
        assert!(plan(&migrations, &recorded, &mut result).is_err());
    }
}
