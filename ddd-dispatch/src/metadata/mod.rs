//! 事件监听元数据（metadata）
//!
//! 以显式注册表替代注解/反射式的“谁监听什么”发现机制：
//! - `EventListener` / `ListeningAggregate` / `TargetRepository`：处理者协议；
//! - `ListenerRegistry`：启动时构建、运行期只读的监听关系查询接口。
//!
mod invoker;
mod listener;
mod registry;

pub use listener::{
    AggregateMethod, EventListener, ListenerFuture, ListenerKind, ListeningAggregate,
    ServiceMethod, TargetRepository,
};
pub use registry::{
    AggregateBinding, AggregateBindingBuilder, AggregateListenerMethod, ListenerMethod,
    ListenerRegistry, ListenerRegistryBuilder, Listeners, ServiceBinding, ServiceBindingBuilder,
};
