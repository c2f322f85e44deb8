//! 执行上下文（ExecutionContext）
//!
//! “谁以何种方式处理该事件”的已解析描述：事件 + 处理者实例 + 监听方法。
//! 只能由 `ExecutionContextDetector` 构造，在一次分发内创建并消费，不做持久化；
//! 需要持久化时使用可序列化的坐标 `TargetExecutionContext`。
//!
use crate::{
    domain_event::EventMessage,
    locator::Instance,
    metadata::{AggregateListenerMethod, ListenerKind, ListenerMethod},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 可持久化的处理者坐标：(处理者类型名, 监听方法名)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetExecutionContext {
    handler_type: String,
    handler_method: String,
}

impl TargetExecutionContext {
    pub fn new(handler_type: impl Into<String>, handler_method: impl Into<String>) -> Self {
        Self {
            handler_type: handler_type.into(),
            handler_method: handler_method.into(),
        }
    }

    pub fn handler_type(&self) -> &str {
        &self.handler_type
    }

    pub fn handler_method(&self) -> &str {
        &self.handler_method
    }
}

impl fmt::Display for TargetExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.handler_type, self.handler_method)
    }
}

/// 服务类处理者的执行上下文
pub struct ServiceExecutionContext {
    handler_name: &'static str,
    kind: ListenerKind,
    method: ListenerMethod,
    handler: Instance,
    event: EventMessage,
}

impl ServiceExecutionContext {
    pub(crate) fn new(
        handler_name: &'static str,
        kind: ListenerKind,
        method: ListenerMethod,
        handler: Instance,
        event: EventMessage,
    ) -> Self {
        Self {
            handler_name,
            kind,
            method,
            handler,
            event,
        }
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    pub fn event(&self) -> &EventMessage {
        &self.event
    }

    pub(crate) fn method(&self) -> &ListenerMethod {
        &self.method
    }

    pub(crate) fn handler(&self) -> &Instance {
        &self.handler
    }
}

/// 聚合处理者的执行上下文：通过所属仓储加载 `target_id` 对应的聚合实例
pub struct AggregateExecutionContext {
    aggregate_type: &'static str,
    method: AggregateListenerMethod,
    repository: Instance,
    event: EventMessage,
    target_id: String,
}

impl AggregateExecutionContext {
    pub(crate) fn new(
        aggregate_type: &'static str,
        method: AggregateListenerMethod,
        repository: Instance,
        event: EventMessage,
        target_id: String,
    ) -> Self {
        Self {
            aggregate_type,
            method,
            repository,
            event,
            target_id,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    pub fn event(&self) -> &EventMessage {
        &self.event
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub(crate) fn method(&self) -> &AggregateListenerMethod {
        &self.method
    }

    pub(crate) fn repository(&self) -> &Instance {
        &self.repository
    }
}

pub enum ExecutionContext {
    Service(ServiceExecutionContext),
    Aggregate(AggregateExecutionContext),
}

impl ExecutionContext {
    /// 处理者类型名（服务名或聚合类型）
    pub fn handler_type(&self) -> &'static str {
        match self {
            ExecutionContext::Service(ctx) => ctx.handler_name(),
            ExecutionContext::Aggregate(ctx) => ctx.aggregate_type(),
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            ExecutionContext::Service(ctx) => ctx.method_name(),
            ExecutionContext::Aggregate(ctx) => ctx.method_name(),
        }
    }

    pub fn event(&self) -> &EventMessage {
        match self {
            ExecutionContext::Service(ctx) => ctx.event(),
            ExecutionContext::Aggregate(ctx) => ctx.event(),
        }
    }

    /// 可持久化的坐标
    pub fn target(&self) -> TargetExecutionContext {
        TargetExecutionContext::new(self.handler_type(), self.method_name())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Service(ctx) => f
                .debug_struct("ServiceExecutionContext")
                .field("handler", &ctx.handler_name)
                .field("kind", &ctx.kind)
                .field("method", &ctx.method_name())
                .field("event_type", &ctx.event.event_type())
                .finish(),
            ExecutionContext::Aggregate(ctx) => f
                .debug_struct("AggregateExecutionContext")
                .field("aggregate", &ctx.aggregate_type)
                .field("method", &ctx.method_name())
                .field("event_type", &ctx.event.event_type())
                .field("target_id", &ctx.target_id)
                .finish(),
        }
    }
}

/// 单个执行上下文的处理结果
#[derive(Debug)]
pub struct ExecutionResult {
    target: TargetExecutionContext,
    cause: Option<anyhow::Error>,
}

impl ExecutionResult {
    pub fn success(target: TargetExecutionContext) -> Self {
        Self {
            target,
            cause: None,
        }
    }

    pub fn failure(target: TargetExecutionContext, cause: anyhow::Error) -> Self {
        Self {
            target,
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.cause.is_none()
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    pub fn target(&self) -> &TargetExecutionContext {
        &self.target
    }
}
