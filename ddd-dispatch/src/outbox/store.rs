//! Outbox 存储协议（OutboxStore）
//!
//! 持久化待投递意图并维护条目生命周期：
//! `Pending → Sent | Failed | Blocked`，其中 `Failed` 在退避时间过后重新可取，
//! `Blocked` 为超过最大尝试次数（或遇到不可重试的配置错误）后的死信状态。
//!
use crate::{
    config::duration_ms,
    domain_event::EventMessage,
    error::{DispatchError, DispatchResult},
    execution::TargetExecutionContext,
};
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use uuid::Uuid;

/// Outbox 中持久化的消息：事件本身以及（广播模式下）已确定的处理者坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    event: EventMessage,
    target: Option<TargetExecutionContext>,
}

impl OutboxMessage {
    /// 整个事件一条记录，投递时重新探测
    pub fn whole(event: EventMessage) -> Self {
        Self {
            event,
            target: None,
        }
    }

    /// 指向单个处理者的记录
    pub fn targeted(event: EventMessage, target: TargetExecutionContext) -> Self {
        Self {
            event,
            target: Some(target),
        }
    }

    pub fn event(&self) -> &EventMessage {
        &self.event
    }

    pub fn target(&self) -> Option<&TargetExecutionContext> {
        self.target.as_ref()
    }
}

/// 调度请求
#[derive(Debug, Clone, Builder)]
pub struct ScheduledDelivery {
    message: OutboxMessage,
    /// 相同键的条目按提交顺序串行投递
    #[builder(into)]
    scheduling_key: Option<String>,
    /// 首次尝试前的最小延迟
    #[builder(default)]
    min_delay: Duration,
}

impl ScheduledDelivery {
    pub fn message(&self) -> &OutboxMessage {
        &self.message
    }

    pub fn scheduling_key(&self) -> Option<&str> {
        self.scheduling_key.as_deref()
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Sent,
    Failed,
    Blocked,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryState::Pending => "pending",
            EntryState::Sent => "sent",
            EntryState::Failed => "failed",
            EntryState::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// 失败重试策略：指数退避，达到最大尝试次数后进入 `Blocked`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempts` 次失败后的等待时间
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    id: Uuid,
    message: OutboxMessage,
    scheduling_key: Option<String>,
    state: EntryState,
    attempts: u32,
    not_before: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(delivery: ScheduledDelivery) -> DispatchResult<Self> {
        let created_at = Utc::now();
        let not_before = delay_from(created_at, delivery.min_delay)?;
        Ok(Self {
            id: Uuid::new_v4(),
            message: delivery.message,
            scheduling_key: delivery.scheduling_key,
            state: EntryState::Pending,
            attempts: 0,
            not_before,
            last_error: None,
            created_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &OutboxMessage {
        &self.message
    }

    pub fn scheduling_key(&self) -> Option<&str> {
        self.scheduling_key.as_deref()
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 是否可在 `now` 时被取出
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, EntryState::Pending | EntryState::Failed) && self.not_before <= now
    }

    /// 记录一次失败：累加尝试次数，按策略退避或进入死信
    pub fn record_failure(&mut self, reason: &str, policy: &RetryPolicy) -> DispatchResult<()> {
        self.attempts += 1;
        self.last_error = Some(reason.to_string());
        if self.attempts >= policy.max_attempts {
            self.state = EntryState::Blocked;
        } else {
            self.state = EntryState::Failed;
            self.not_before = delay_from(Utc::now(), policy.backoff(self.attempts))?;
        }
        Ok(())
    }

    /// 不经重试直接进入死信
    pub fn block(&mut self, reason: &str) {
        self.attempts += 1;
        self.last_error = Some(reason.to_string());
        self.state = EntryState::Blocked;
    }

    pub fn mark_sent(&mut self) {
        self.state = EntryState::Sent;
        self.last_error = None;
    }
}

/// `from + delay`，超出可表示的时间范围时为配置错误
fn delay_from(from: DateTime<Utc>, delay: Duration) -> DispatchResult<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| from.checked_add_signed(delay))
        .ok_or_else(|| DispatchError::Config {
            reason: format!("delay of {}ms is out of range", delay.as_millis()),
        })
}

/// 一次拉取得到的条目集合
#[derive(Debug, Clone, Default)]
pub struct OutboxBatch {
    entries: Vec<OutboxEntry>,
}

impl OutboxBatch {
    pub fn new(entries: Vec<OutboxEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(OutboxEntry::id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 保存一条待投递意图，返回条目标识
    async fn schedule(&self, delivery: ScheduledDelivery) -> DispatchResult<Uuid>;

    /// 取出至多 `max_size` 条到期条目；相同调度键只返回队首
    async fn fetch_batch(&self, max_size: usize) -> DispatchResult<OutboxBatch>;

    /// 单条失败标记，由存储按自身的重试策略处理
    async fn mark_failed(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()>;

    /// 不可重试的失败，条目直接进入死信
    async fn mark_blocked(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()>;

    /// 整批成功
    async fn mark_sent_successfully(&self, batch: &OutboxBatch) -> DispatchResult<()>;
}

#[async_trait]
impl<T> OutboxStore for Arc<T>
where
    T: OutboxStore + ?Sized,
{
    async fn schedule(&self, delivery: ScheduledDelivery) -> DispatchResult<Uuid> {
        (**self).schedule(delivery).await
    }

    async fn fetch_batch(&self, max_size: usize) -> DispatchResult<OutboxBatch> {
        (**self).fetch_batch(max_size).await
    }

    async fn mark_failed(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()> {
        (**self).mark_failed(entry, reason).await
    }

    async fn mark_blocked(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()> {
        (**self).mark_blocked(entry, reason).await
    }

    async fn mark_sent_successfully(&self, batch: &OutboxBatch) -> DispatchResult<()> {
        (**self).mark_sent_successfully(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(min_delay: Duration) -> ScheduledDelivery {
        let event = EventMessage::builder()
            .event_type("InventoryReserved")
            .payload(serde_json::json!({"sku": "A-1"}))
            .build();
        ScheduledDelivery::builder()
            .message(OutboxMessage::whole(event))
            .scheduling_key("InventoryReserved")
            .min_delay(min_delay)
            .build()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn min_delay_defers_first_attempt() {
        let now = Utc::now();
        let entry = OutboxEntry::new(delivery(Duration::from_secs(60))).unwrap();
        assert_eq!(entry.state(), EntryState::Pending);
        assert!(!entry.is_due(now));

        let entry = OutboxEntry::new(delivery(Duration::ZERO)).unwrap();
        assert!(entry.is_due(Utc::now()));
        assert_eq!(entry.scheduling_key(), Some("InventoryReserved"));
    }

    #[test]
    fn failures_back_off_then_block() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
        };
        let mut entry = OutboxEntry::new(delivery(Duration::ZERO)).unwrap();

        entry.record_failure("gateway down", &policy).unwrap();
        assert_eq!(entry.state(), EntryState::Failed);
        assert_eq!(entry.attempts(), 1);
        assert!(!entry.is_due(Utc::now()));

        entry.record_failure("gateway down", &policy).unwrap();
        assert_eq!(entry.state(), EntryState::Blocked);
        assert_eq!(entry.last_error(), Some("gateway down"));
        assert!(!entry.is_due(Utc::now() + chrono::Duration::days(1)));
    }

    #[test]
    fn block_skips_retries() {
        let mut entry = OutboxEntry::new(delivery(Duration::ZERO)).unwrap();
        entry.block("handler not resolvable: ghost");
        assert_eq!(entry.state(), EntryState::Blocked);
        assert_eq!(entry.attempts(), 1);
        assert!(!entry.is_due(Utc::now() + chrono::Duration::days(1)));
    }

    #[test]
    fn out_of_range_delays_are_errors() {
        let err = OutboxEntry::new(delivery(Duration::from_millis(u64::MAX))).unwrap_err();
        assert!(err.is_configuration());

        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100_000_000_000_000_000),
            max_backoff: Duration::from_millis(100_000_000_000_000_000),
        };
        let mut entry = OutboxEntry::new(delivery(Duration::ZERO)).unwrap();
        let err = entry.record_failure("boom", &policy).unwrap_err();
        assert!(matches!(err, DispatchError::Config { .. }));
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = OutboxEntry::new(delivery(Duration::ZERO)).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        let back: OutboxEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
