//! 持久化实现

pub mod memory;
mod postgres_unit_of_work;
mod rows;
mod tx_repositories;

pub use memory::InMemoryUnitOfWorkFactory;
pub use postgres_unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkFactory};
