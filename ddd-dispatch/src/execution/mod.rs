//! 执行上下文（execution）
//!
//! 事件到处理者的解析与调用：
//! - `ExecutionContext`：带标签的联合体，区分服务与聚合两种处理方式；
//! - `ExecutionContextDetector`：查询元数据并解析实例；
//! - `ExecutionContextProcessor`：调用监听方法并记录结果；
//! - `EventConsumer`：对外的消费接口。
//!
mod consumer;
mod context;
mod detector;
mod processor;

pub use consumer::{EventConsumer, ExecutionContextConsumer};
pub use context::{
    AggregateExecutionContext, ExecutionContext, ExecutionResult, ServiceExecutionContext,
    TargetExecutionContext,
};
pub use detector::ExecutionContextDetector;
pub use processor::ExecutionContextProcessor;
