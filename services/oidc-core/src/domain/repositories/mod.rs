//! 仓储接口

mod auth_request_repository;
mod client_repository;
mod device_authorization_repository;
mod token_repository;
mod user_repository;

pub use auth_request_repository::*;
pub use client_repository::*;
pub use device_authorization_repository::*;
pub use token_repository::*;
pub use user_repository::*;
