//! common - 通用类型和工具库

pub mod context;
pub mod snowflake;
pub mod types;

pub use context::*;
pub use snowflake::*;
pub use types::*;
