//! 内存存储
//!
//! `dashmap` 表保存已提交数据；事务按实体键加锁，写入先暂存，提交时整体应用。

mod repositories;
mod store;
mod unit_of_work;

pub use unit_of_work::{InMemoryUnitOfWork, InMemoryUnitOfWorkFactory};
