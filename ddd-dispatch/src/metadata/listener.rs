//! 监听者（Listener）
//!
//! 定义能够响应领域事件的两类处理者：服务类（领域服务、仓储、出站适配器、
//! 查询处理器、应用服务）与聚合；以及监听方法的函数签名。
//!
use crate::error::DispatchResult;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务类监听者的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerKind {
    DomainService,
    Repository,
    OutboundAdapter,
    QueryHandler,
    ApplicationService,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListenerKind::DomainService => "domain-service",
            ListenerKind::Repository => "repository",
            ListenerKind::OutboundAdapter => "outbound-adapter",
            ListenerKind::QueryHandler => "query-handler",
            ListenerKind::ApplicationService => "application-service",
        };
        f.write_str(s)
    }
}

/// 服务类监听者
///
/// `NAME` 是服务定位器中的注册名，也是 `TargetExecutionContext` 中持久化的坐标，
/// 应保持稳定，不随重构变化。
pub trait EventListener: Send + Sync + 'static {
    const NAME: &'static str;
    const KIND: ListenerKind;
}

/// 可被定向事件驱动的聚合
pub trait ListeningAggregate: Send + Sync + 'static {
    const TYPE: &'static str;
}

/// 聚合的所属仓储：定向事件通过它加载目标聚合，并在处理后保存
#[async_trait]
pub trait TargetRepository<A>: Send + Sync + 'static
where
    A: ListeningAggregate,
{
    /// 仓储在服务定位器中的注册名
    const NAME: &'static str;

    async fn load(&self, aggregate_id: &str) -> DispatchResult<Option<A>>;

    async fn save(&self, aggregate: A) -> DispatchResult<()>;
}

/// 监听方法返回的 future
pub type ListenerFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;

/// 服务类监听方法，例如 `NotificationService::notify_customer`
pub type ServiceMethod<H, E> = for<'a> fn(&'a H, &'a E) -> ListenerFuture<'a>;

/// 聚合监听方法（同步修改聚合状态）
pub type AggregateMethod<A, E> = fn(&mut A, &E) -> anyhow::Result<()>;
