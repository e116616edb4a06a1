//! 设备授权管理（RFC 8628）
//!
//! 状态：`Pending -> {Completed, Denied}`。过期在读取时判定，不是存储的状态。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use xoidc_common::{ClientId, RequestContext};
use xoidc_errors::AppResult;

use crate::domain::entities::{DeviceAuthorization, DeviceAuthorizationStatus};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory, finish};
use crate::error::OidcError;

pub struct DeviceAuthorizationManager {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl DeviceAuthorizationManager {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow_factory }
    }

    /// 保存设备授权
    ///
    /// user code 已存在时返回 `DuplicateUserCode`（即使对应同一个 device code），调用方应重新生成 user code。
    pub async fn store(
        &self,
        ctx: &RequestContext,
        client_id: &ClientId,
        device_code: &str,
        user_code: &str,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> AppResult<()> {
        let authorization =
            DeviceAuthorization::new(*client_id, device_code, user_code, expires_at, scopes);

        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.insert(uow.as_ref(), &authorization).await;
        finish(uow, result).await?;

        metrics::counter!("oidc_device_authorizations_total", "outcome" => "started").increment(1);
        debug!(client_id = %client_id, user_code, "Device authorization stored");
        Ok(())
    }

    async fn insert(&self, uow: &dyn UnitOfWork, authorization: &DeviceAuthorization) -> AppResult<()> {
        uow.clients()
            .find_by_id(&authorization.client_id)
            .await?
            .ok_or(OidcError::ClientNotFound)?;

        uow.device_authorizations().insert(authorization).await
    }

    /// 设备轮询：必须由发起授权的 client 查询
    pub async fn get_by_device_and_client(
        &self,
        ctx: &RequestContext,
        client_id: &ClientId,
        device_code: &str,
    ) -> AppResult<DeviceAuthorization> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.device_authorizations().find_by_device_code(device_code).await;
        let authorization = finish(uow, result)
            .await?
            .filter(|a| &a.client_id == client_id)
            .ok_or(OidcError::DeviceCodeNotFound)?;

        if authorization.status() == DeviceAuthorizationStatus::Expired {
            return Err(OidcError::DeviceCodeExpired.into());
        }
        Ok(authorization)
    }

    /// 用户确认页面按 user code 查询
    pub async fn get_by_user_code(
        &self,
        ctx: &RequestContext,
        user_code: &str,
    ) -> AppResult<DeviceAuthorization> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.device_authorizations().find_by_user_code(user_code).await;
        finish(uow, result)
            .await?
            .filter(|a| a.status() != DeviceAuthorizationStatus::Expired)
            .ok_or_else(|| OidcError::UserCodeNotFound.into())
    }

    /// 用户同意授权
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        user_code: &str,
        subject: &str,
    ) -> AppResult<()> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = self
            .transition(uow.as_ref(), user_code, |a| a.complete(subject))
            .await;
        finish(uow, result).await?;

        metrics::counter!("oidc_device_authorizations_total", "outcome" => "completed")
            .increment(1);
        info!(user_code, subject, "Device authorization completed");
        Ok(())
    }

    /// 用户拒绝授权
    pub async fn deny(&self, ctx: &RequestContext, user_code: &str) -> AppResult<()> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = self
            .transition(uow.as_ref(), user_code, DeviceAuthorization::deny)
            .await;
        finish(uow, result).await?;

        metrics::counter!("oidc_device_authorizations_total", "outcome" => "denied").increment(1);
        info!(user_code, "Device authorization denied");
        Ok(())
    }

    /// 在行锁下检查并修改状态，终态不可再变
    async fn transition<F>(&self, uow: &dyn UnitOfWork, user_code: &str, apply: F) -> AppResult<()>
    where
        F: FnOnce(&mut DeviceAuthorization) + Send,
    {
        let mut authorization = uow
            .device_authorizations()
            .find_by_user_code_for_update(user_code)
            .await?
            .ok_or(OidcError::UserCodeNotFound)?;

        match authorization.status() {
            DeviceAuthorizationStatus::Pending => {}
            DeviceAuthorizationStatus::Expired => return Err(OidcError::UserCodeNotFound.into()),
            DeviceAuthorizationStatus::Completed => {
                warn!(user_code, "Device authorization already completed");
                return Err(OidcError::DeviceAuthorizationFinished("completed").into());
            }
            DeviceAuthorizationStatus::Denied => {
                warn!(user_code, "Device authorization already denied");
                return Err(OidcError::DeviceAuthorizationFinished("denied").into());
            }
        }

        apply(&mut authorization);
        uow.device_authorizations().update(&authorization).await
    }
}
