//! 服务定位器（ServiceLocator）
//!
//! 按稳定名称解析处理者实例与聚合仓储实例。实例的注册与生命周期由宿主应用负责，
//! 分发链路只做只读查询。
//!
use crate::metadata::{EventListener, ListeningAggregate, TargetRepository};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// 类型擦除后的处理者实例
pub type Instance = Arc<dyn Any + Send + Sync>;

pub trait ServiceLocator: Send + Sync {
    /// 按注册名解析实例，未注册返回 `None`
    fn instance_for(&self, type_name: &str) -> Option<Instance>;
}

impl<T> ServiceLocator for Arc<T>
where
    T: ServiceLocator + ?Sized,
{
    fn instance_for(&self, type_name: &str) -> Option<Instance> {
        (**self).instance_for(type_name)
    }
}

/// 基于内存的 ServiceLocator 实现
/// - 以名称为键保存实例，重复注册时覆盖旧实例
#[derive(Default)]
pub struct InMemoryServiceLocator {
    instances: DashMap<String, Instance>,
}

impl InMemoryServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&self, name: impl Into<String>, instance: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.instances.insert(name.into(), instance as Instance);
    }

    /// 以 `EventListener::NAME` 注册服务类监听者
    pub fn register_listener<H>(&self, listener: Arc<H>)
    where
        H: EventListener,
    {
        self.register(H::NAME, listener);
    }

    /// 以 `TargetRepository::NAME` 注册聚合仓储
    pub fn register_repository<A, R>(&self, repository: Arc<R>)
    where
        A: ListeningAggregate,
        R: TargetRepository<A>,
    {
        self.register(<R as TargetRepository<A>>::NAME, repository);
    }

    /// 已注册的名称（只读视图）
    pub fn registered(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }
}

impl ServiceLocator for InMemoryServiceLocator {
    fn instance_for(&self, type_name: &str) -> Option<Instance> {
        self.instances.get(type_name).map(|e| e.value().clone())
    }
}
