//! 监听者注册表（ListenerRegistry）
//!
//! 启动时一次性构建的元数据：回答“哪些处理者、哪些方法监听某类事件”。
//! 构建完成后只读，可在多个分发组件间共享。
//!
use super::invoker::{InvokeAggregate, InvokeService, TypedAggregateMethod, TypedServiceMethod};
use super::listener::{
    AggregateMethod, EventListener, ListenerKind, ListeningAggregate, ServiceMethod,
    TargetRepository,
};
use crate::domain_event::DomainEvent;
use crate::error::{DispatchError, DispatchResult};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

/// 服务类监听方法
#[derive(Clone)]
pub struct ListenerMethod {
    name: &'static str,
    event_type: &'static str,
    pub(crate) invoker: Arc<dyn InvokeService>,
}

impl ListenerMethod {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }
}

/// 聚合监听方法
#[derive(Clone)]
pub struct AggregateListenerMethod {
    name: &'static str,
    event_type: &'static str,
    pub(crate) invoker: Arc<dyn InvokeAggregate>,
}

impl AggregateListenerMethod {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }
}

/// 一个服务类监听者及其全部监听方法
#[derive(Clone)]
pub struct ServiceBinding {
    name: &'static str,
    kind: ListenerKind,
    methods: Vec<ListenerMethod>,
}

impl ServiceBinding {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// 按注册顺序返回监听给定事件类型的方法
    pub fn methods_for<'a>(
        &'a self,
        event_type: &'a str,
    ) -> impl Iterator<Item = &'a ListenerMethod> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.event_type == event_type)
    }

    pub(crate) fn method(&self, name: &str, event_type: &str) -> Option<&ListenerMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.event_type == event_type)
    }
}

/// 一个聚合类型、其所属仓储及全部监听方法
#[derive(Clone)]
pub struct AggregateBinding {
    aggregate_type: &'static str,
    repository: &'static str,
    methods: Vec<AggregateListenerMethod>,
}

impl AggregateBinding {
    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn repository(&self) -> &'static str {
        self.repository
    }

    pub fn methods_for<'a>(
        &'a self,
        event_type: &'a str,
    ) -> impl Iterator<Item = &'a AggregateListenerMethod> + 'a {
        self.methods
            .iter()
            .filter(move |m| m.event_type == event_type)
    }

    pub(crate) fn method(&self, name: &str, event_type: &str) -> Option<&AggregateListenerMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.event_type == event_type)
    }
}

/// 某事件类型的监听者集合（按注册顺序）
#[derive(Default)]
pub struct Listeners<'a> {
    pub services: Vec<&'a ServiceBinding>,
    pub aggregates: Vec<&'a AggregateBinding>,
}

impl Listeners<'_> {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.aggregates.is_empty()
    }
}

#[derive(Default)]
struct EventIndex {
    services: Vec<usize>,
    aggregates: Vec<usize>,
}

/// 元数据注册表：即事件监听关系的只读“预言机”
pub struct ListenerRegistry {
    services: Vec<ServiceBinding>,
    aggregates: Vec<AggregateBinding>,
    by_event: HashMap<&'static str, EventIndex>,
}

impl ListenerRegistry {
    pub fn builder() -> ListenerRegistryBuilder {
        ListenerRegistryBuilder::default()
    }

    /// 查询监听给定事件类型的服务与聚合
    pub fn listeners_for(&self, event_type: &str) -> Listeners<'_> {
        let Some(index) = self.by_event.get(event_type) else {
            return Listeners::default();
        };

        Listeners {
            services: index.services.iter().map(|&i| &self.services[i]).collect(),
            aggregates: index
                .aggregates
                .iter()
                .map(|&i| &self.aggregates[i])
                .collect(),
        }
    }

    /// 查询某处理者（服务名或聚合类型）上监听给定事件类型的方法名
    pub fn methods_listening(&self, handler_type: &str, event_type: &str) -> Vec<&'static str> {
        if let Some(service) = self.service(handler_type) {
            return service.methods_for(event_type).map(|m| m.name).collect();
        }
        if let Some(aggregate) = self.aggregate(handler_type) {
            return aggregate.methods_for(event_type).map(|m| m.name).collect();
        }
        Vec::new()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceBinding> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn aggregate(&self, aggregate_type: &str) -> Option<&AggregateBinding> {
        self.aggregates
            .iter()
            .find(|a| a.aggregate_type == aggregate_type)
    }
}

/// 服务监听者的方法登记
pub struct ServiceBindingBuilder<H> {
    methods: Vec<ListenerMethod>,
    _marker: PhantomData<fn() -> H>,
}

impl<H> ServiceBindingBuilder<H>
where
    H: EventListener,
{
    /// 登记一个监听方法；同一处理者可以有多个方法监听同一事件
    pub fn on<E>(mut self, method_name: &'static str, method: ServiceMethod<H, E>) -> Self
    where
        E: DomainEvent,
    {
        self.methods.push(ListenerMethod {
            name: method_name,
            event_type: E::EVENT_TYPE,
            invoker: Arc::new(TypedServiceMethod::new(method)),
        });
        self
    }
}

/// 聚合监听者的方法登记
pub struct AggregateBindingBuilder<A, R> {
    methods: Vec<AggregateListenerMethod>,
    _marker: PhantomData<fn() -> (A, R)>,
}

impl<A, R> AggregateBindingBuilder<A, R>
where
    A: ListeningAggregate,
    R: TargetRepository<A>,
{
    pub fn on<E>(mut self, method_name: &'static str, method: AggregateMethod<A, E>) -> Self
    where
        E: DomainEvent,
    {
        self.methods.push(AggregateListenerMethod {
            name: method_name,
            event_type: E::EVENT_TYPE,
            invoker: Arc::new(TypedAggregateMethod::<A, R, E>::new(method)),
        });
        self
    }
}

#[derive(Default)]
pub struct ListenerRegistryBuilder {
    services: Vec<ServiceBinding>,
    aggregates: Vec<AggregateBinding>,
}

impl ListenerRegistryBuilder {
    /// 登记服务类监听者
    pub fn service<H>(
        mut self,
        configure: impl FnOnce(ServiceBindingBuilder<H>) -> ServiceBindingBuilder<H>,
    ) -> Self
    where
        H: EventListener,
    {
        let methods = configure(ServiceBindingBuilder {
            methods: Vec::new(),
            _marker: PhantomData,
        })
        .methods;

        self.services.push(ServiceBinding {
            name: H::NAME,
            kind: H::KIND,
            methods,
        });
        self
    }

    /// 登记聚合监听者及其所属仓储
    pub fn aggregate<A, R>(
        mut self,
        configure: impl FnOnce(AggregateBindingBuilder<A, R>) -> AggregateBindingBuilder<A, R>,
    ) -> Self
    where
        A: ListeningAggregate,
        R: TargetRepository<A>,
    {
        let methods = configure(AggregateBindingBuilder {
            methods: Vec::new(),
            _marker: PhantomData,
        })
        .methods;

        self.aggregates.push(AggregateBinding {
            aggregate_type: A::TYPE,
            repository: <R as TargetRepository<A>>::NAME,
            methods,
        });
        self
    }

    pub fn build(self) -> DispatchResult<ListenerRegistry> {
        // 服务名与聚合类型共用 TargetExecutionContext 的坐标空间
        let mut handler_names = HashSet::new();
        let names = self
            .services
            .iter()
            .map(|s| {
                (
                    s.name,
                    s.methods
                        .iter()
                        .map(|m| (m.name, m.event_type))
                        .collect::<Vec<_>>(),
                )
            })
            .chain(self.aggregates.iter().map(|a| {
                (
                    a.aggregate_type,
                    a.methods.iter().map(|m| (m.name, m.event_type)).collect(),
                )
            }));

        for (handler, methods) in names {
            if !handler_names.insert(handler) {
                return Err(DispatchError::DuplicateListener {
                    handler: handler.to_string(),
                    method: "*".to_string(),
                });
            }
            let mut seen = HashSet::new();
            for (method, event_type) in methods {
                if !seen.insert((method, event_type)) {
                    return Err(DispatchError::DuplicateListener {
                        handler: handler.to_string(),
                        method: method.to_string(),
                    });
                }
            }
        }

        let mut by_event: HashMap<&'static str, EventIndex> = HashMap::new();
        for (i, service) in self.services.iter().enumerate() {
            let types = service.methods.iter().map(|m| m.event_type).collect();
            for t in unique(types) {
                by_event.entry(t).or_default().services.push(i);
            }
        }
        for (i, aggregate) in self.aggregates.iter().enumerate() {
            let types = aggregate.methods.iter().map(|m| m.event_type).collect();
            for t in unique(types) {
                by_event.entry(t).or_default().aggregates.push(i);
            }
        }

        Ok(ListenerRegistry {
            services: self.services,
            aggregates: self.aggregates,
            by_event,
        })
    }
}

fn unique(types: Vec<&'static str>) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    types.into_iter().filter(|t| seen.insert(*t)).collect()
}
