//! 监听方法的类型擦除
//!
//! 注册时把具体的 `(处理者类型, 事件类型, 方法)` 固化为一个 trait object，
//! 分发时只做一次 downcast 与载荷解码，不再进行任何查找。
//!
use super::listener::{
    AggregateMethod, EventListener, ListeningAggregate, ServiceMethod, TargetRepository,
};
use crate::{
    domain_event::{DomainEvent, EventMessage},
    error::DispatchError,
};
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;

#[async_trait]
pub(crate) trait InvokeService: Send + Sync {
    async fn invoke(
        &self,
        instance: &(dyn Any + Send + Sync),
        event: &EventMessage,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub(crate) trait InvokeAggregate: Send + Sync {
    async fn invoke(
        &self,
        repository: &(dyn Any + Send + Sync),
        target_id: &str,
        event: &EventMessage,
    ) -> anyhow::Result<()>;
}

pub(crate) struct TypedServiceMethod<H, E> {
    method: ServiceMethod<H, E>,
}

impl<H, E> TypedServiceMethod<H, E> {
    pub(crate) fn new(method: ServiceMethod<H, E>) -> Self {
        Self { method }
    }
}

#[async_trait]
impl<H, E> InvokeService for TypedServiceMethod<H, E>
where
    H: EventListener,
    E: DomainEvent,
{
    async fn invoke(
        &self,
        instance: &(dyn Any + Send + Sync),
        event: &EventMessage,
    ) -> anyhow::Result<()> {
        let handler = instance
            .downcast_ref::<H>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                expected: H::NAME.to_string(),
                found: "unknown".to_string(),
            })?;
        let event = event.decode::<E>()?;

        (self.method)(handler, &event).await
    }
}

pub(crate) struct TypedAggregateMethod<A, R, E> {
    method: AggregateMethod<A, E>,
    _repository: PhantomData<fn() -> R>,
}

impl<A, R, E> TypedAggregateMethod<A, R, E> {
    pub(crate) fn new(method: AggregateMethod<A, E>) -> Self {
        Self {
            method,
            _repository: PhantomData,
        }
    }
}

#[async_trait]
impl<A, R, E> InvokeAggregate for TypedAggregateMethod<A, R, E>
where
    A: ListeningAggregate,
    R: TargetRepository<A>,
    E: DomainEvent,
{
    async fn invoke(
        &self,
        repository: &(dyn Any + Send + Sync),
        target_id: &str,
        event: &EventMessage,
    ) -> anyhow::Result<()> {
        let repository = repository
            .downcast_ref::<R>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                expected: <R as TargetRepository<A>>::NAME.to_string(),
                found: "unknown".to_string(),
            })?;
        let event = event.decode::<E>()?;

        let mut aggregate = repository
            .load(target_id)
            .await?
            .ok_or_else(|| DispatchError::AggregateNotFound {
                aggregate: A::TYPE.to_string(),
                id: target_id.to_string(),
            })?;

        (self.method)(&mut aggregate, &event)?;

        repository.save(aggregate).await?;

        Ok(())
    }
}
