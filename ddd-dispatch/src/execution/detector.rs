//! 执行上下文探测（ExecutionContextDetector）
//!
//! 查询元数据注册表得到事件的监听者，再通过服务定位器解析实例：
//! - 定向事件：聚合监听者只作用于 `target_id` 对应的实例，实例经所属仓储加载；
//! - 显式声明监听该事件类型的服务监听者随后追加；
//! - 实例无法解析属于配置错误，立即返回，不做重试。
//!
use super::context::{
    AggregateExecutionContext, ExecutionContext, ServiceExecutionContext, TargetExecutionContext,
};
use crate::{
    domain_event::EventMessage,
    error::{DispatchError, DispatchResult},
    locator::{Instance, ServiceLocator},
    metadata::{AggregateBinding, ListenerRegistry, ServiceBinding},
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ExecutionContextDetector {
    registry: Arc<ListenerRegistry>,
    locator: Arc<dyn ServiceLocator>,
}

impl ExecutionContextDetector {
    pub fn new(registry: Arc<ListenerRegistry>, locator: Arc<dyn ServiceLocator>) -> Self {
        Self { registry, locator }
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// 探测事件的全部执行上下文；无监听者时返回空列表
    pub fn detect(&self, event: &EventMessage) -> DispatchResult<Vec<ExecutionContext>> {
        let listeners = self.registry.listeners_for(event.event_type());
        let mut contexts = Vec::new();

        if let Some(target_id) = event.target_id() {
            for binding in listeners.aggregates {
                let repository = self.repository_for(binding)?;
                for method in binding.methods_for(event.event_type()) {
                    contexts.push(ExecutionContext::Aggregate(AggregateExecutionContext::new(
                        binding.aggregate_type(),
                        method.clone(),
                        repository.clone(),
                        event.clone(),
                        target_id.to_string(),
                    )));
                }
            }
        }

        for binding in listeners.services {
            let handler = self.handler_for(binding)?;
            for method in binding.methods_for(event.event_type()) {
                contexts.push(ExecutionContext::Service(ServiceExecutionContext::new(
                    binding.name(),
                    binding.kind(),
                    method.clone(),
                    handler.clone(),
                    event.clone(),
                )));
            }
        }

        debug!(
            event_type = event.event_type(),
            event_id = event.event_id(),
            contexts = contexts.len(),
            "execution contexts detected"
        );

        Ok(contexts)
    }

    /// 由持久化的坐标直接还原单个执行上下文，不经过完整探测
    pub fn resolve(
        &self,
        event: &EventMessage,
        target: &TargetExecutionContext,
    ) -> DispatchResult<ExecutionContext> {
        let unknown = || DispatchError::UnknownTarget {
            handler: target.handler_type().to_string(),
            method: target.handler_method().to_string(),
            event_type: event.event_type().to_string(),
        };

        if let Some(binding) = self.registry.service(target.handler_type()) {
            let method = binding
                .method(target.handler_method(), event.event_type())
                .ok_or_else(unknown)?;
            let handler = self.handler_for(binding)?;

            return Ok(ExecutionContext::Service(ServiceExecutionContext::new(
                binding.name(),
                binding.kind(),
                method.clone(),
                handler,
                event.clone(),
            )));
        }

        if let Some(binding) = self.registry.aggregate(target.handler_type()) {
            let method = binding
                .method(target.handler_method(), event.event_type())
                .ok_or_else(unknown)?;
            let target_id = event
                .target_id()
                .ok_or_else(|| DispatchError::MissingTargetId {
                    event_type: event.event_type().to_string(),
                })?;
            let repository = self.repository_for(binding)?;

            return Ok(ExecutionContext::Aggregate(AggregateExecutionContext::new(
                binding.aggregate_type(),
                method.clone(),
                repository,
                event.clone(),
                target_id.to_string(),
            )));
        }

        Err(unknown())
    }

    fn handler_for(&self, binding: &ServiceBinding) -> DispatchResult<Instance> {
        self.locator
            .instance_for(binding.name())
            .ok_or_else(|| DispatchError::UnresolvableHandler {
                handler: binding.name().to_string(),
            })
    }

    fn repository_for(&self, binding: &AggregateBinding) -> DispatchResult<Instance> {
        self.locator
            .instance_for(binding.repository())
            .ok_or_else(|| DispatchError::MissingRepository {
                aggregate: binding.aggregate_type().to_string(),
                repository: binding.repository().to_string(),
            })
    }
}
