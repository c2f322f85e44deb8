//! 内存版 Outbox 存储（InMemoryOutboxStore）
//!
//! 适用于测试与单进程场景：
//! - 按提交顺序取出到期条目；
//! - 每个调度键每批只返回队首，队首未到期或已进入死信时，同键后续条目一并等待；
//! - 不定义多轮询器间的租约，假定每个存储只有一个轮询器。
//!
use super::store::{
    EntryState, OutboxBatch, OutboxEntry, OutboxStore, RetryPolicy, ScheduledDelivery,
};
use crate::error::{DispatchError, DispatchResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryOutboxStore {
    entries: Mutex<Vec<OutboxEntry>>,
    policy: RetryPolicy,
}

impl InMemoryOutboxStore {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 全部条目的快照（按提交顺序）
    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_in(&self, state: EntryState) -> usize {
        self.lock()
            .map(|e| e.iter().filter(|entry| entry.state() == state).count())
            .unwrap_or(0)
    }

    pub fn get(&self, id: Uuid) -> Option<OutboxEntry> {
        self.lock()
            .ok()
            .and_then(|e| e.iter().find(|entry| entry.id() == id).cloned())
    }

    fn lock(&self) -> DispatchResult<MutexGuard<'_, Vec<OutboxEntry>>> {
        self.entries
            .lock()
            .map_err(|e| DispatchError::outbox(e.to_string()))
    }
}

fn find_mut(entries: &mut [OutboxEntry], id: Uuid) -> DispatchResult<&mut OutboxEntry> {
    entries
        .iter_mut()
        .find(|e| e.id() == id)
        .ok_or_else(|| DispatchError::outbox(format!("unknown outbox entry: {id}")))
}

fn report_dead_letter(entry: &OutboxEntry, reason: &str) {
    warn!(
        entry_id = %entry.id(),
        event_type = entry.message().event().event_type(),
        attempts = entry.attempts(),
        reason,
        "outbox entry dead-lettered"
    );
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn schedule(&self, delivery: ScheduledDelivery) -> DispatchResult<Uuid> {
        let entry = OutboxEntry::new(delivery)?;
        let id = entry.id();
        debug!(
            entry_id = %id,
            event_type = entry.message().event().event_type(),
            scheduling_key = entry.scheduling_key(),
            "outbox entry scheduled"
        );
        self.lock()?.push(entry);
        Ok(id)
    }

    async fn fetch_batch(&self, max_size: usize) -> DispatchResult<OutboxBatch> {
        let now = Utc::now();
        let entries = self.lock()?;

        let mut seen_keys: HashSet<&str> = HashSet::new();
        let mut batch = Vec::new();
        for entry in entries.iter() {
            if batch.len() >= max_size {
                break;
            }
            if entry.state() == EntryState::Sent {
                continue;
            }
            // 同键只看队首：队首不可取时后续条目也不可取
            if let Some(key) = entry.scheduling_key() {
                if !seen_keys.insert(key) {
                    continue;
                }
            }
            if entry.is_due(now) {
                batch.push(entry.clone());
            }
        }

        Ok(OutboxBatch::new(batch))
    }

    async fn mark_failed(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()> {
        let mut entries = self.lock()?;
        let stored = find_mut(&mut entries, entry.id())?;

        stored.record_failure(reason, &self.policy)?;
        if stored.state() == EntryState::Blocked {
            report_dead_letter(stored, reason);
        }
        Ok(())
    }

    async fn mark_blocked(&self, entry: &OutboxEntry, reason: &str) -> DispatchResult<()> {
        let mut entries = self.lock()?;
        let stored = find_mut(&mut entries, entry.id())?;

        stored.block(reason);
        report_dead_letter(stored, reason);
        Ok(())
    }

    async fn mark_sent_successfully(&self, batch: &OutboxBatch) -> DispatchResult<()> {
        let ids: HashSet<Uuid> = batch.ids().into_iter().collect();
        let mut entries = self.lock()?;
        for entry in entries.iter_mut().filter(|e| ids.contains(&e.id())) {
            entry.mark_sent();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::EventMessage;
    use crate::outbox::OutboxMessage;
    use std::time::Duration;

    fn delivery(sku: &str, key: Option<&str>) -> ScheduledDelivery {
        let event = EventMessage::builder()
            .event_type("InventoryReserved")
            .payload(serde_json::json!({ "sku": sku }))
            .build();
        ScheduledDelivery::builder()
            .message(OutboxMessage::whole(event))
            .maybe_scheduling_key(key)
            .build()
    }

    fn sku(entry: &OutboxEntry) -> String {
        entry.message().event().payload()["sku"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn blocking_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn fetch_respects_submission_order_and_size() {
        let store = InMemoryOutboxStore::default();
        for i in 0..5 {
            store.schedule(delivery(&i.to_string(), None)).await.unwrap();
        }

        let batch = store.fetch_batch(3).await.unwrap();
        let skus: Vec<String> = batch.entries().iter().map(sku).collect();
        assert_eq!(skus, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn same_key_returns_head_only() {
        let store = InMemoryOutboxStore::default();
        store.schedule(delivery("a", Some("k"))).await.unwrap();
        store.schedule(delivery("b", Some("k"))).await.unwrap();
        store.schedule(delivery("c", None)).await.unwrap();

        let batch = store.fetch_batch(10).await.unwrap();
        let skus: Vec<String> = batch.entries().iter().map(sku).collect();
        assert_eq!(skus, vec!["a", "c"]);

        store.mark_sent_successfully(&batch).await.unwrap();
        let batch = store.fetch_batch(10).await.unwrap();
        let skus: Vec<String> = batch.entries().iter().map(sku).collect();
        assert_eq!(skus, vec!["b"]);
    }

    #[tokio::test]
    async fn blocked_head_holds_back_its_key() {
        let store = InMemoryOutboxStore::new(blocking_policy());
        store.schedule(delivery("a", Some("k"))).await.unwrap();
        store.schedule(delivery("b", Some("k"))).await.unwrap();
        store.schedule(delivery("c", Some("other"))).await.unwrap();

        let batch = store.fetch_batch(10).await.unwrap();
        store.mark_failed(&batch.entries()[0], "boom").await.unwrap();
        assert_eq!(store.count_in(EntryState::Blocked), 1);

        let batch = store.fetch_batch(10).await.unwrap();
        let skus: Vec<String> = batch.entries().iter().map(sku).collect();
        assert_eq!(skus, vec!["c"]);
    }

    #[tokio::test]
    async fn failed_entry_waits_for_backoff() {
        let store = InMemoryOutboxStore::new(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(3600),
            max_backoff: Duration::from_secs(3600),
        });
        let id = store.schedule(delivery("a", None)).await.unwrap();

        let batch = store.fetch_batch(10).await.unwrap();
        store.mark_failed(&batch.entries()[0], "boom").await.unwrap();

        assert!(store.fetch_batch(10).await.unwrap().is_empty());
        let entry = store.get(id).unwrap();
        assert_eq!(entry.state(), EntryState::Failed);
        assert_eq!(entry.attempts(), 1);
    }

    #[tokio::test]
    async fn marking_unknown_entry_fails() {
        let store = InMemoryOutboxStore::default();
        let entry = OutboxEntry::new(delivery("a", None)).unwrap();
        assert!(matches!(
            store.mark_failed(&entry, "boom").await,
            Err(DispatchError::Outbox { .. })
        ));
        assert!(matches!(
            store.mark_blocked(&entry, "boom").await,
            Err(DispatchError::Outbox { .. })
        ));
    }

    #[tokio::test]
    async fn blocked_entry_is_dead_lettered_on_first_mark() {
        let store = InMemoryOutboxStore::default();
        let id = store.schedule(delivery("a", Some("k"))).await.unwrap();
        store.schedule(delivery("b", Some("k"))).await.unwrap();

        let batch = store.fetch_batch(10).await.unwrap();
        store
            .mark_blocked(&batch.entries()[0], "handler not resolvable: ghost")
            .await
            .unwrap();

        let entry = store.get(id).unwrap();
        assert_eq!(entry.state(), EntryState::Blocked);
        assert_eq!(entry.attempts(), 1);
        assert!(store.fetch_batch(10).await.unwrap().is_empty());
    }
}
