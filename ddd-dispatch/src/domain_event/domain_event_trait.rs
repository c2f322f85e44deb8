use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
pub trait DomainEvent:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型的稳定名称（用于监听者匹配、路由与 Outbox 排序键），避免依赖 `type_name::<T>()`
    const EVENT_TYPE: &'static str;

    /// 目标聚合标识；返回 `Some` 表示该事件只投递给对应的聚合实例
    fn target_id(&self) -> Option<String> {
        None
    }
}
