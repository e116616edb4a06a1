//! PostgreSQL 事务选项
//!
//! 令牌轮换与会话终止依赖行级锁，默认使用 READ COMMITTED 配合 `FOR UPDATE`。

use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use xoidc_errors::{AppError, AppResult};

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// 读已提交（PostgreSQL 默认）
    #[default]
    ReadCommitted,
    /// 可重复读
    RepeatableRead,
    /// 可串行化
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// 事务选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub read_only: bool,
    /// 单条语句超时（毫秒），0 表示不限制
    pub statement_timeout_ms: u64,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_statement_timeout_ms(mut self, ms: u64) -> Self {
        self.statement_timeout_ms = ms;
        self
    }

    /// 生成 SET TRANSACTION 语句
    pub fn to_sql(&self) -> String {
        let mode = if self.read_only {
            "READ ONLY"
        } else {
            "READ WRITE"
        };
        format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation_level.as_sql(),
            mode
        )
    }
}

/// 开始带选项的事务
pub async fn begin_with_options(
    pool: &PgPool,
    options: &TransactionOptions,
) -> AppResult<Transaction<'static, Postgres>> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

    if options != &TransactionOptions::default() {
        sqlx::query(&options.to_sql())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to set transaction options: {}", e)))?;
    }

    if options.statement_timeout_ms > 0 {
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            options.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to set statement timeout: {}", e)))?;
    }

    debug!(
        isolation = options.isolation_level.as_sql(),
        read_only = options.read_only,
        "Transaction started"
    );
    Ok(tx)
}
