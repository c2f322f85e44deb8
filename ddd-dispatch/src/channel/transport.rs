//! 通道（Channel）与通道工厂（ChannelFactory）
//!
//! 通道把名称与能力绑定在一起，能力由所包装的发布者/消费者决定；
//! 请求传输不具备的能力时立即失败，不做静默降级。
//!
use super::capability::ChannelCapability;
use crate::{
    domain_event::EventMessage,
    error::{DispatchError, DispatchResult},
    execution::{EventConsumer, ExecutionResult, TargetExecutionContext},
    publishing::EventPublisher,
};
use async_trait::async_trait;
use bon::Builder;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Channel {
    name: String,
    capability: ChannelCapability,
    publisher: Option<Arc<dyn EventPublisher>>,
    consumer: Option<Arc<dyn EventConsumer>>,
}

impl Channel {
    pub fn publish_only(name: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            name: name.into(),
            capability: ChannelCapability::Publish,
            publisher: Some(publisher),
            consumer: None,
        }
    }

    pub fn consume_only(name: impl Into<String>, consumer: Arc<dyn EventConsumer>) -> Self {
        Self {
            name: name.into(),
            capability: ChannelCapability::Consume,
            publisher: None,
            consumer: Some(consumer),
        }
    }

    pub fn processing(
        name: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
        consumer: Arc<dyn EventConsumer>,
    ) -> Self {
        Self {
            name: name.into(),
            capability: ChannelCapability::Process,
            publisher: Some(publisher),
            consumer: Some(consumer),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> ChannelCapability {
        self.capability
    }

    pub async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        self.publisher(ChannelCapability::Publish)?
            .publish(event)
            .await
    }

    pub async fn consume(&self, event: &EventMessage) -> DispatchResult<Vec<ExecutionResult>> {
        self.consumer(ChannelCapability::Consume)?
            .consume(event)
            .await
    }

    pub async fn consume_target(
        &self,
        event: &EventMessage,
        target: &TargetExecutionContext,
    ) -> DispatchResult<ExecutionResult> {
        self.consumer(ChannelCapability::Consume)?
            .consume_target(event, target)
            .await
    }

    fn publisher(&self, requested: ChannelCapability) -> DispatchResult<&Arc<dyn EventPublisher>> {
        self.publisher
            .as_ref()
            .ok_or_else(|| unsupported(&self.name, requested))
    }

    fn consumer(&self, requested: ChannelCapability) -> DispatchResult<&Arc<dyn EventConsumer>> {
        self.consumer
            .as_ref()
            .ok_or_else(|| unsupported(&self.name, requested))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .finish()
    }
}

fn unsupported(channel: &str, requested: ChannelCapability) -> DispatchError {
    DispatchError::UnsupportedCapability {
        channel: channel.to_string(),
        requested: requested.to_string(),
    }
}

pub trait ChannelFactory: Send + Sync {
    fn publish_only_channel(&self, name: &str) -> DispatchResult<Channel>;

    fn consume_only_channel(&self, name: &str) -> DispatchResult<Channel>;

    fn processing_channel(&self, name: &str) -> DispatchResult<Channel>;
}

/// 包装某个具体传输的通道工厂；传输可能只提供发布端或消费端
#[derive(Builder, Clone)]
pub struct TransportChannelFactory {
    #[builder(into)]
    transport: String,
    publisher: Option<Arc<dyn EventPublisher>>,
    consumer: Option<Arc<dyn EventConsumer>>,
}

impl TransportChannelFactory {
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// 传输本身具备的最大能力
    pub fn capability(&self) -> Option<ChannelCapability> {
        match (&self.publisher, &self.consumer) {
            (Some(_), Some(_)) => Some(ChannelCapability::Process),
            (Some(_), None) => Some(ChannelCapability::Publish),
            (None, Some(_)) => Some(ChannelCapability::Consume),
            (None, None) => None,
        }
    }

    fn require_publisher(
        &self,
        name: &str,
        requested: ChannelCapability,
    ) -> DispatchResult<Arc<dyn EventPublisher>> {
        self.publisher
            .clone()
            .ok_or_else(|| self.unsupported(name, requested))
    }

    fn require_consumer(
        &self,
        name: &str,
        requested: ChannelCapability,
    ) -> DispatchResult<Arc<dyn EventConsumer>> {
        self.consumer
            .clone()
            .ok_or_else(|| self.unsupported(name, requested))
    }

    fn unsupported(&self, name: &str, requested: ChannelCapability) -> DispatchError {
        unsupported(&format!("{name} ({})", self.transport), requested)
    }
}

impl ChannelFactory for TransportChannelFactory {
    fn publish_only_channel(&self, name: &str) -> DispatchResult<Channel> {
        let publisher = self.require_publisher(name, ChannelCapability::Publish)?;
        Ok(Channel::publish_only(name, publisher))
    }

    fn consume_only_channel(&self, name: &str) -> DispatchResult<Channel> {
        let consumer = self.require_consumer(name, ChannelCapability::Consume)?;
        Ok(Channel::consume_only(name, consumer))
    }

    fn processing_channel(&self, name: &str) -> DispatchResult<Channel> {
        let publisher = self.require_publisher(name, ChannelCapability::Process)?;
        let consumer = self.require_consumer(name, ChannelCapability::Process)?;
        Ok(Channel::processing(name, publisher, consumer))
    }
}

#[async_trait]
impl EventPublisher for Channel {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        Channel::publish(self, event).await
    }
}
