//! Token Exchange 校验（RFC 8693）

use std::sync::Arc;

use tracing::{debug, warn};
use xoidc_common::{RequestContext, UserId};
use xoidc_errors::AppResult;

use crate::domain::entities::{ActorClaim, TokenExchangeRequest, TokenType};
use crate::domain::unit_of_work::{UnitOfWorkFactory, finish};
use crate::error::OidcError;

/// 模拟 scope 前缀，`impersonate:<subject>`
pub const IMPERSONATE_SCOPE_PREFIX: &str = "impersonate:";

pub const SCOPE_ADDRESS: &str = "address";

pub struct TokenExchangeValidator {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl TokenExchangeValidator {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow_factory }
    }

    /// 校验并改写交换请求
    ///
    /// 通过后 `request.subject` 为最终签发主体，`request.scopes` 为过滤后的 scope，
    /// 模拟时 `request.act` 记录发起交换的原主体。
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        request: &mut TokenExchangeRequest,
    ) -> AppResult<()> {
        let requested = *request
            .requested_token_type
            .get_or_insert(TokenType::RefreshToken);

        if request.subject_token_type == TokenType::IdToken && requested == TokenType::RefreshToken
        {
            return Err(OidcError::IdTokenToRefreshToken.into());
        }

        let user_id = UserId::from_string(&request.exchange_subject)
            .map_err(|_| OidcError::UserNotFound)?;
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.users().find_by_id(&user_id).await;
        let user = finish(uow, result).await?.ok_or(OidcError::UserNotFound)?;

        let delegation = request.is_delegation();
        if !delegation && !user.is_admin {
            warn!(subject = %request.exchange_subject, "Impersonation without admin permission");
            return Err(OidcError::ImpersonationNotPermitted.into());
        }

        let mut allowed = Vec::with_capacity(request.scopes.len());
        let mut target = None;
        for scope in request.scopes.drain(..) {
            if scope == SCOPE_ADDRESS {
                continue;
            }
            if let Some(subject) = scope.strip_prefix(IMPERSONATE_SCOPE_PREFIX) {
                target = Some(subject.to_string());
            }
            allowed.push(scope);
        }
        request.scopes = allowed;

        if let Some(target) = target {
            if delegation {
                warn!(
                    subject = %request.exchange_subject,
                    "Impersonation requested on a delegated exchange"
                );
                return Err(OidcError::ImpersonationNotPermitted.into());
            }
            debug!(
                subject = %request.exchange_subject,
                target = %target,
                "Impersonating subject"
            );
            request.act = Some(ActorClaim {
                sub: request.exchange_subject.clone(),
            });
            request.subject = target;
        }

        Ok(())
    }
}
