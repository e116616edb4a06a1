//! 请求上下文
//!
//! 承载取消信号与截止时间，所有存储调用都在上下文内执行。
//! 写操作在提交前必须调用 [`RequestContext::check`]。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use xoidc_errors::{AppError, AppResult};

/// 请求上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// 创建无截止时间的上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带超时的上下文
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 使用外部取消令牌
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// 派生子上下文，父上下文取消时子上下文一并取消
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 检查是否已取消或超时
    pub fn check(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::cancelled("operation cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AppError::cancelled("deadline exceeded"));
            }
        }
        Ok(())
    }

    /// 在上下文内执行 future，取消或超时时立即返回
    pub async fn run<F, T>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.check()?;

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(AppError::cancelled("operation cancelled")),
                    _ = tokio::time::sleep_until(deadline) => Err(AppError::cancelled("deadline exceeded")),
                    res = fut => res,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(AppError::cancelled("operation cancelled")),
                    res = fut => res,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = RequestContext::new();
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancelled_context_rejects() {
        let ctx = RequestContext::new();
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(AppError::Cancelled(_))));

        let res = ctx.run(async { Ok(1) }).await;
        assert!(matches!(res, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = RequestContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let res: AppResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(AppError::Cancelled(_))));
    }
}
