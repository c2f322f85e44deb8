//! 事件发布（EventPublisher）协议
//!
//! 以显式构造、依赖注入的发布者实例取代进程级静态入口，
//! 便于在不同调用点配置不同的通道与事务语义。
//!
use crate::{
    domain_event::{DomainEvent, EventMessage},
    error::DispatchResult,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()>;
}

#[async_trait]
impl<T> EventPublisher for Arc<T>
where
    T: EventPublisher + ?Sized,
{
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        (**self).publish(event).await
    }
}

/// 直接发布具体领域事件的便捷扩展
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    async fn publish_event<E>(&self, event: &E) -> DispatchResult<()>
    where
        E: DomainEvent,
    {
        self.publish(EventMessage::from_event(event)?).await
    }
}

impl<T> EventPublisherExt for T where T: EventPublisher + ?Sized {}
