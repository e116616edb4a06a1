//! 领域实体

pub mod auth_request;
pub mod client;
pub mod device_authorization;
pub mod token;
pub mod token_exchange;
pub mod user;

pub use auth_request::*;
pub use client::*;
pub use device_authorization::*;
pub use token::*;
pub use token_exchange::*;
pub use user::*;
