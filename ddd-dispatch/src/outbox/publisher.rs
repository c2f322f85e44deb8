//! Outbox 发布（OutboxPublisher）
//!
//! 不直接调用处理者，而是写入 Outbox 条目，由轮询器稍后投递：
//! - `SingleEntry`：整个事件一条记录，投递时重新探测；
//! - `Broadcast`：发布时即探测，每个执行上下文一条记录，各自独立重试。
//!
use super::store::{OutboxMessage, OutboxStore, ScheduledDelivery};
use crate::{
    config::duration_ms,
    domain_event::EventMessage,
    error::DispatchResult,
    execution::{ExecutionContextDetector, TargetExecutionContext},
    publishing::EventPublisher,
};
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxMode {
    SingleEntry,
    #[default]
    Broadcast,
}

/// 调度键的生成方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// 不设调度键，条目之间无顺序保证
    Unordered,
    /// 以事件类型为键；广播模式下再按处理者坐标细分
    #[default]
    ByEventType,
}

impl OrderingPolicy {
    pub fn scheduling_key(
        &self,
        event: &EventMessage,
        target: Option<&TargetExecutionContext>,
    ) -> Option<String> {
        match (self, target) {
            (OrderingPolicy::Unordered, _) => None,
            (OrderingPolicy::ByEventType, None) => Some(event.event_type().to_string()),
            (OrderingPolicy::ByEventType, Some(target)) => {
                Some(format!("{}@{}", event.event_type(), target))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxPublisherConfig {
    pub mode: OutboxMode,
    pub ordering: OrderingPolicy,
    #[serde(with = "duration_ms")]
    pub min_delay: Duration,
}

impl Default for OutboxPublisherConfig {
    fn default() -> Self {
        Self {
            mode: OutboxMode::default(),
            ordering: OrderingPolicy::default(),
            min_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Builder, Clone)]
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    detector: Arc<ExecutionContextDetector>,
    #[builder(default)]
    config: OutboxPublisherConfig,
}

impl OutboxPublisher {
    pub fn config(&self) -> &OutboxPublisherConfig {
        &self.config
    }

    fn delivery(&self, message: OutboxMessage) -> ScheduledDelivery {
        let key = self
            .config
            .ordering
            .scheduling_key(message.event(), message.target());
        ScheduledDelivery::builder()
            .message(message)
            .maybe_scheduling_key(key)
            .min_delay(self.config.min_delay)
            .build()
    }
}

#[async_trait]
impl EventPublisher for OutboxPublisher {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        match self.config.mode {
            OutboxMode::SingleEntry => {
                self.store
                    .schedule(self.delivery(OutboxMessage::whole(event)))
                    .await?;
            }
            OutboxMode::Broadcast => {
                // 配置错误在发布时即暴露
                let targets: Vec<TargetExecutionContext> = self
                    .detector
                    .detect(&event)?
                    .iter()
                    .map(|ctx| ctx.target())
                    .collect();

                debug!(
                    event_type = event.event_type(),
                    event_id = event.event_id(),
                    entries = targets.len(),
                    "broadcasting event to outbox"
                );

                for target in targets {
                    self.store
                        .schedule(self.delivery(OutboxMessage::targeted(event.clone(), target)))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
