//! 通道与路由（channel）
//!
//! 同步/异步投递的选择以通道能力显式建模：
//! 通道 = 名称 + 能力（发布 / 消费 / 处理），路由器按事件类型把发布请求交给对应通道。
//!
mod capability;
mod router;
mod transport;

pub use capability::ChannelCapability;
pub use router::{EventRouter, EventRouterBuilder};
pub use transport::{Channel, ChannelFactory, TransportChannelFactory};
