//! xoidc 核心库
//!
//! OAuth 2.0 / OpenID Connect 授权与令牌生命周期引擎：
//! - `domain`: 实体、仓储接口、Unit of Work 与九个核心组件
//! - `infrastructure`: 内存与 PostgreSQL 存储
//! - `engine`: 按配置组装各组件

pub mod domain;
pub mod engine;
pub mod error;
pub mod infrastructure;

pub use engine::OidcEngine;
pub use error::OidcError;
