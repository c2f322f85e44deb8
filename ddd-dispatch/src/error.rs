//! 事件分发统一错误定义
//!
//! 按三类划分：配置错误（处理器/仓储无法解析、通道能力不支持等，立即失败且不重试）、
//! 处理器执行错误（仅在 `ExecutionResult` 中体现，不越过 Consumer 边界）、
//! 投递错误（Outbox 存储与事务边界相关）。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 配置错误 ---
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
    #[error("handler not resolvable: {handler}")]
    UnresolvableHandler { handler: String },
    #[error("repository not resolvable: aggregate={aggregate}, repository={repository}")]
    MissingRepository {
        aggregate: String,
        repository: String,
    },
    #[error("unknown target: handler={handler}, method={method}, event_type={event_type}")]
    UnknownTarget {
        handler: String,
        method: String,
        event_type: String,
    },
    #[error("listener already registered: handler={handler}, method={method}")]
    DuplicateListener { handler: String, method: String },
    #[error("unsupported channel capability: channel={channel}, requested={requested}")]
    UnsupportedCapability { channel: String, requested: String },
    #[error("unknown channel: {name}")]
    UnknownChannel { name: String },
    #[error("no active transaction for event: {event_type}")]
    NoActiveTransaction { event_type: String },

    // --- 处理器执行 ---
    #[error("aggregate not found: type={aggregate}, id={id}")]
    AggregateNotFound { aggregate: String, id: String },
    #[error("event has no target id: {event_type}")]
    MissingTargetId { event_type: String },
    #[error("repository error: {reason}")]
    Repository { reason: String },

    // --- 事务/投递 ---
    #[error("transaction error: {reason}")]
    Transaction { reason: String },
    #[error("outbox error: {reason}")]
    Outbox { reason: String },
}

impl DispatchError {
    /// 是否为配置错误（致命、立即暴露、不可重试）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DispatchError::Config { .. }
                | DispatchError::UnresolvableHandler { .. }
                | DispatchError::MissingRepository { .. }
                | DispatchError::UnknownTarget { .. }
                | DispatchError::DuplicateListener { .. }
                | DispatchError::UnsupportedCapability { .. }
                | DispatchError::UnknownChannel { .. }
        )
    }

    pub(crate) fn outbox(reason: impl Into<String>) -> Self {
        DispatchError::Outbox {
            reason: reason.into(),
        }
    }

    pub(crate) fn transaction(reason: impl Into<String>) -> Self {
        DispatchError::Transaction {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<figment::Error> for DispatchError {
    fn from(err: figment::Error) -> Self {
        DispatchError::Config {
            reason: err.to_string(),
        }
    }
}
