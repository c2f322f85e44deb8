//! 事件发布（publishing）
//!
//! - `EventPublisher`：对外暴露的发布接口；
//! - `ImmediatePublisher` / `TransactionalPublisher`：进程内直接分发；
//! - `TransactionBoundary`：发布侧依赖的事务边界抽象。
//!
//! 持久化投递见 `outbox` 模块，按事件类型选择通道见 `channel` 模块。
//!
mod direct;
mod publisher;
mod transaction;

pub use direct::{ImmediatePublisher, TransactionalPublisher};
pub use publisher::{EventPublisher, EventPublisherExt};
pub use transaction::{AfterCommit, InMemoryTransactionBoundary, TransactionBoundary};
