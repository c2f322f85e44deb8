//! 事件消费（EventConsumer）
//!
//! 两种入口：
//! - `consume`：完整探测后依次执行，结果数与探测到的上下文数一致；
//! - `consume_target`：按 Outbox 中记录的坐标只执行一个上下文。
//!
//! 处理器错误只体现在结果中；配置错误（实例无法解析、坐标未知）才以 `Err` 返回。
//! 消费侧不做重试，重试策略属于发布侧。
//!
use super::context::{ExecutionResult, TargetExecutionContext};
use super::detector::ExecutionContextDetector;
use super::processor::ExecutionContextProcessor;
use crate::{domain_event::EventMessage, error::DispatchResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EventConsumer: Send + Sync {
    async fn consume(&self, event: &EventMessage) -> DispatchResult<Vec<ExecutionResult>>;

    async fn consume_target(
        &self,
        event: &EventMessage,
        target: &TargetExecutionContext,
    ) -> DispatchResult<ExecutionResult>;
}

#[async_trait]
impl<T> EventConsumer for Arc<T>
where
    T: EventConsumer + ?Sized,
{
    async fn consume(&self, event: &EventMessage) -> DispatchResult<Vec<ExecutionResult>> {
        (**self).consume(event).await
    }

    async fn consume_target(
        &self,
        event: &EventMessage,
        target: &TargetExecutionContext,
    ) -> DispatchResult<ExecutionResult> {
        (**self).consume_target(event, target).await
    }
}

/// 基于探测器与处理器的默认消费者
#[derive(Clone)]
pub struct ExecutionContextConsumer {
    detector: Arc<ExecutionContextDetector>,
    processor: ExecutionContextProcessor,
}

impl ExecutionContextConsumer {
    pub fn new(detector: Arc<ExecutionContextDetector>) -> Self {
        Self {
            detector,
            processor: ExecutionContextProcessor::new(),
        }
    }

    pub fn detector(&self) -> &Arc<ExecutionContextDetector> {
        &self.detector
    }
}

#[async_trait]
impl EventConsumer for ExecutionContextConsumer {
    async fn consume(&self, event: &EventMessage) -> DispatchResult<Vec<ExecutionResult>> {
        let contexts = self.detector.detect(event)?;
        if contexts.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.processor.process_all(&contexts).await)
    }

    async fn consume_target(
        &self,
        event: &EventMessage,
        target: &TargetExecutionContext,
    ) -> DispatchResult<ExecutionResult> {
        let context = self.detector.resolve(event, target)?;
        Ok(self.processor.process(&context).await)
    }
}
