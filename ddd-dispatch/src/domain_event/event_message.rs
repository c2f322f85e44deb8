//! 事件消息（EventMessage）
//!
//! 事件在分发链路上的统一形态：处理器匹配只依赖 `event_type`，
//! 聚合定向投递依赖 `target_id`，载荷以 JSON 保存以便写入 Outbox 后再还原。
//!
use crate::{
    domain_event::{DomainEvent, EventContext},
    error::{DispatchError, DispatchResult},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventMessage {
    /// 事件唯一标识符
    #[builder(into, default = Uuid::new_v4().to_string())]
    event_id: String,
    /// 事件类型，用于匹配监听者与路由
    #[builder(into)]
    event_type: String,
    /// 目标聚合 ID，存在时事件只投递给该聚合实例
    #[builder(into)]
    target_id: Option<String>,
    /// 事件发生时间
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
    /// 事件负载
    payload: Value,
    /// 业务上下文信息
    #[builder(default)]
    context: EventContext,
}

impl EventMessage {
    /// 由具体领域事件构造消息
    pub fn from_event<E>(event: &E) -> DispatchResult<Self>
    where
        E: DomainEvent,
    {
        Ok(EventMessage::builder()
            .event_type(E::EVENT_TYPE)
            .maybe_target_id(event.target_id())
            .payload(serde_json::to_value(event)?)
            .build())
    }

    /// 替换业务上下文
    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    /// 还原为具体领域事件，类型名不一致时返回 `TypeMismatch`
    pub fn decode<E>(&self) -> DispatchResult<E>
    where
        E: DomainEvent,
    {
        if self.event_type != E::EVENT_TYPE {
            return Err(DispatchError::TypeMismatch {
                expected: E::EVENT_TYPE.to_string(),
                found: self.event_type.clone(),
            });
        }

        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// 是否为聚合定向事件
    pub fn is_targeted(&self) -> bool {
        self.target_id.is_some()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }
}
