//! 持久化投递（outbox）
//!
//! 发布时写入待投递意图，由轮询器在事务提交后或其他进程中异步投递，
//! 提供至少一次的投递语义与按处理者隔离的重试。
//!
mod inmemory;
mod poller;
mod publisher;
mod store;

pub use inmemory::InMemoryOutboxStore;
pub use poller::{
    ConsumerSender, OutboxPoller, OutboxSender, PollReport, PollerConfig, SendOutcome,
};
pub use publisher::{OrderingPolicy, OutboxMode, OutboxPublisher, OutboxPublisherConfig};
pub use store::{
    EntryState, OutboxBatch, OutboxEntry, OutboxMessage, OutboxStore, RetryPolicy,
    ScheduledDelivery,
};
