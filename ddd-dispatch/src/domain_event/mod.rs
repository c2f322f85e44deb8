//! 领域事件（Domain Event）与事件消息
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`），以及在分发、Outbox 持久化
//! 与通道传输之间流转的统一形态 `EventMessage`。

mod domain_event_trait;
mod event_context;
mod event_message;

pub use domain_event_trait::DomainEvent;
pub use event_context::EventContext;
pub use event_message::EventMessage;
