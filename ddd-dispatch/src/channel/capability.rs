use serde::{Deserialize, Serialize};
use std::fmt;

/// 通道能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCapability {
    /// 只发布，例如只写的消息中间件生产者
    Publish,
    /// 只消费，用于仅入站的传输
    Consume,
    /// 发布与消费兼具
    Process,
}

impl ChannelCapability {
    pub fn can_publish(&self) -> bool {
        matches!(self, ChannelCapability::Publish | ChannelCapability::Process)
    }

    pub fn can_consume(&self) -> bool {
        matches!(self, ChannelCapability::Consume | ChannelCapability::Process)
    }
}

impl fmt::Display for ChannelCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelCapability::Publish => "publish",
            ChannelCapability::Consume => "consume",
            ChannelCapability::Process => "process",
        };
        f.write_str(s)
    }
}
