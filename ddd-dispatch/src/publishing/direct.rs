//! 进程内直接发布
//!
//! - `ImmediatePublisher`：立即、同步地调用全部处理者；
//! - `TransactionalPublisher`：存在活动事务时推迟到提交之后再分发，回滚则不分发；
//!   放行名单中的事件类型不受事务约束，立即分发；非放行事件在无事务时直接拒绝。
//!
//! 提交后触发的分发中处理者失败不会回滚已提交的事务，只记录日志。
//!
use super::publisher::EventPublisher;
use super::transaction::TransactionBoundary;
use crate::{
    config::DispatchConfig,
    domain_event::EventMessage,
    error::{DispatchError, DispatchResult},
    execution::{EventConsumer, ExecutionResult},
};
use async_trait::async_trait;
use bon::Builder;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 执行消费并记录失败，返回失败数量
async fn dispatch(consumer: &dyn EventConsumer, event: &EventMessage) -> DispatchResult<usize> {
    let results = consumer.consume(event).await?;
    Ok(report_failures(event, &results))
}

fn report_failures(event: &EventMessage, results: &[ExecutionResult]) -> usize {
    let failed: Vec<&ExecutionResult> = results.iter().filter(|r| !r.is_success()).collect();
    if !failed.is_empty() {
        warn!(
            event_type = event.event_type(),
            event_id = event.event_id(),
            failed = failed.len(),
            total = results.len(),
            targets = ?failed.iter().map(|r| r.target().to_string()).collect::<Vec<_>>(),
            "event dispatched with failures"
        );
    }
    failed.len()
}

/// 不涉及事务的直接发布
#[derive(Clone)]
pub struct ImmediatePublisher {
    consumer: Arc<dyn EventConsumer>,
}

impl ImmediatePublisher {
    pub fn new(consumer: Arc<dyn EventConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl EventPublisher for ImmediatePublisher {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        dispatch(self.consumer.as_ref(), &event).await?;
        Ok(())
    }
}

/// 绑定事务的直接发布
#[derive(Builder, Clone)]
pub struct TransactionalPublisher {
    consumer: Arc<dyn EventConsumer>,
    transaction_boundary: Arc<dyn TransactionBoundary>,
    /// 不受事务推迟约束的事件类型
    #[builder(default)]
    pass_through: HashSet<String>,
}

impl TransactionalPublisher {
    pub fn new(
        consumer: Arc<dyn EventConsumer>,
        transaction_boundary: Arc<dyn TransactionBoundary>,
    ) -> Self {
        Self {
            consumer,
            transaction_boundary,
            pass_through: HashSet::new(),
        }
    }

    /// 放行名单取自 `DispatchConfig::pass_through`
    pub fn from_config(
        consumer: Arc<dyn EventConsumer>,
        transaction_boundary: Arc<dyn TransactionBoundary>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            consumer,
            transaction_boundary,
            pass_through: config.pass_through_set(),
        }
    }

    /// 追加放行的事件类型
    pub fn with_pass_through<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pass_through
            .extend(event_types.into_iter().map(Into::into));
        self
    }

    pub fn is_pass_through(&self, event_type: &str) -> bool {
        self.pass_through.contains(event_type)
    }
}

#[async_trait]
impl EventPublisher for TransactionalPublisher {
    async fn publish(&self, event: EventMessage) -> DispatchResult<()> {
        if self.is_pass_through(event.event_type()) {
            debug!(
                event_type = event.event_type(),
                event_id = event.event_id(),
                "pass-through event dispatched immediately"
            );
            dispatch(self.consumer.as_ref(), &event).await?;
            return Ok(());
        }

        if !self.transaction_boundary.is_active()? {
            return Err(DispatchError::NoActiveTransaction {
                event_type: event.event_type().to_string(),
            });
        }

        let consumer = self.consumer.clone();
        self.transaction_boundary
            .register_after_commit(Box::new(move || {
                async move {
                    if let Err(err) = dispatch(consumer.as_ref(), &event).await {
                        error!(
                            event_type = event.event_type(),
                            event_id = event.event_id(),
                            error = %err,
                            "after-commit dispatch failed; committed state is kept"
                        );
                    }
                }
                .boxed()
            }))
    }
}
