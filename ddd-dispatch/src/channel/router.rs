//! 事件路由（EventRouter）
//!
//! 按事件类型选择通道：先查覆盖表，未命中则使用默认通道。
//! 路由表在构建时校验，引用未知通道或不具备发布能力的通道都会立即失败。
//!
use super::transport::Channel;
use crate::{
    config::RouterConfig,
    domain_event::EventMessage,
    error::{DispatchError, DispatchResult},
    publishing::EventPublisher,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EventRouter {
    channels: HashMap<String, Channel>,
    default_channel: String,
    routes: HashMap<String, String>,
}

impl EventRouter {
    pub fn builder() -> EventRouterBuilder {
        EventRouterBuilder::default()
    }

    /// 由配置与已构建的通道组装路由
    pub fn from_config(
        config: &RouterConfig,
        channels: impl IntoIterator<Item = Channel>,
    ) -> DispatchResult<Self> {
        let mut builder = Self::builder().default_channel(&config.default_channel);
        for channel in channels {
            builder = builder.channel(channel);
        }
        for (event_type, channel) in &config.routes {
            builder = builder.route(event_type, channel);
        }
        builder.build()
    }

    /// 事件类型对应的通道名
    pub fn route(&self, event_type: &str) -> &str {
        self.routes
            .get(event_type)
            .map(String::as_str)
            .unwrap_or(&self.default_channel)
    }

    pub fn channel_for(&self, event_type: &str) -> DispatchResult<&Channel> {
        let name = self.route(event_type);
        self.channels
            .get(name)
            .ok_or_else(|| DispatchError::UnknownChannel {
                name: name.to_string(),
            })
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }
}

#[async_trait]
impl EventPublisher for EventRouter {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        let channel = self.channel_for(event.event_type())?;
        debug!(
            event_type = event.event_type(),
            event_id = event.event_id(),
            channel = channel.name(),
            "routing event"
        );
        channel.publish(event).await
    }
}

#[derive(Debug, Default)]
pub struct EventRouterBuilder {
    channels: HashMap<String, Channel>,
    default_channel: Option<String>,
    routes: HashMap<String, String>,
}

impl EventRouterBuilder {
    /// 同名通道后注册者覆盖先注册者
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channels.insert(channel.name().to_string(), channel);
        self
    }

    pub fn default_channel(mut self, name: impl Into<String>) -> Self {
        self.default_channel = Some(name.into());
        self
    }

    pub fn route(mut self, event_type: impl Into<String>, channel: impl Into<String>) -> Self {
        self.routes.insert(event_type.into(), channel.into());
        self
    }

    pub fn build(self) -> DispatchResult<EventRouter> {
        let default_channel = self.default_channel.ok_or_else(|| DispatchError::Config {
            reason: "event router requires a default channel".into(),
        })?;

        let referenced = std::iter::once(&default_channel).chain(self.routes.values());
        for name in referenced {
            let channel = self
                .channels
                .get(name)
                .ok_or_else(|| DispatchError::UnknownChannel { name: name.clone() })?;
            if !channel.capability().can_publish() {
                return Err(DispatchError::UnsupportedCapability {
                    channel: name.clone(),
                    requested: "publish".into(),
                });
            }
        }

        Ok(EventRouter {
            channels: self.channels,
            default_channel,
            routes: self.routes,
        })
    }
}
