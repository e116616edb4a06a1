//! 领域服务

mod authorization_request_manager;
mod claims_assembler;
mod client_registry;
mod credential_verifier;
mod device_authorization_manager;
mod signing_key;
mod token_exchange_validator;
mod token_lifecycle_manager;
mod token_policy;

pub use authorization_request_manager::*;
pub use claims_assembler::*;
pub use client_registry::*;
pub use credential_verifier::*;
pub use device_authorization_manager::*;
pub use signing_key::*;
pub use token_exchange_validator::*;
pub use token_lifecycle_manager::*;
pub use token_policy::*;
