//! 领域事件路由与事务投递（ddd-dispatch）
//!
//! 给定一个已发布的领域事件：
//! - 找出所有需要响应它的处理者（`metadata` 注册表 + `locator` 实例解析 + `execution` 探测）；
//! - 在正确的事务与顺序保证下调用处理者（`publishing` 直接发布，可推迟到事务提交后）；
//! - 需要跨事务或跨进程时，经 `outbox` 持久化并由轮询器以至少一次的语义投递；
//! - 通过 `channel` 按事件类型选择投递方式。
//!
//! 错误分三类（见 `error`）：配置错误立即暴露且不重试；处理者执行错误只体现在
//! `ExecutionResult` 中；投递错误交给 Outbox 的退避策略。
//!
//! 典型用法：
//! 1. 为领域事件实现 `DomainEvent`，为处理者实现 `EventListener` / `ListeningAggregate`；
//! 2. 用 `ListenerRegistry::builder()` 在启动时登记监听方法，并在 `InMemoryServiceLocator` 中注册实例；
//! 3. 组装 `ExecutionContextDetector` 与 `ExecutionContextConsumer`；
//! 4. 选择 `TransactionalPublisher`、`OutboxPublisher` 或 `EventRouter` 作为发布入口。
//!
pub mod channel;
pub mod config;
pub mod domain_event;
pub mod error;
pub mod execution;
pub mod locator;
pub mod metadata;
pub mod outbox;
pub mod publishing;

#[cfg(test)]
mod test_support;
