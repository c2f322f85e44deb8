//! 单元测试共用的事件、监听者与装配
//!
use crate::domain_event::{DomainEvent, EventMessage};
use crate::error::DispatchResult;
use crate::execution::{ExecutionContextConsumer, ExecutionContextDetector};
use crate::locator::InMemoryServiceLocator;
use crate::metadata::{
    EventListener, ListenerFuture, ListenerKind, ListenerRegistry, ListeningAggregate,
    TargetRepository,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReserved {
    pub sku: String,
}

impl DomainEvent for InventoryReserved {
    const EVENT_TYPE: &'static str = "InventoryReserved";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
}

impl OrderPlaced {
    pub fn new(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
        }
    }
}

impl DomainEvent for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";

    fn target_id(&self) -> Option<String> {
        Some(self.order_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unheard;

impl DomainEvent for Unheard {
    const EVENT_TYPE: &'static str = "Unheard";
}

#[derive(Default)]
pub struct NotificationService {
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl EventListener for NotificationService {
    const NAME: &'static str = "notification";
    const KIND: ListenerKind = ListenerKind::DomainService;
}

impl NotificationService {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("notification gateway unavailable");
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    pub fn notify_warehouse<'a>(&'a self, event: &'a InventoryReserved) -> ListenerFuture<'a> {
        Box::pin(async move { self.record(format!("warehouse:{}", event.sku)) })
    }

    pub fn audit_reservation<'a>(&'a self, event: &'a InventoryReserved) -> ListenerFuture<'a> {
        Box::pin(async move { self.record(format!("audit:{}", event.sku)) })
    }

    pub fn notify_customer<'a>(&'a self, event: &'a OrderPlaced) -> ListenerFuture<'a> {
        Box::pin(async move { self.record(format!("customer:{}", event.order_id)) })
    }
}

#[derive(Default)]
pub struct ReportingService {
    count: AtomicUsize,
    panicking: AtomicBool,
}

impl EventListener for ReportingService {
    const NAME: &'static str = "reporting";
    const KIND: ListenerKind = ListenerKind::QueryHandler;
}

impl ReportingService {
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn count_reservation<'a>(&'a self, _event: &'a InventoryReserved) -> ListenerFuture<'a> {
        Box::pin(async move {
            if self.panicking.load(Ordering::SeqCst) {
                panic!("report store corrupted");
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    pub id: String,
    pub confirmed: bool,
}

impl OrderState {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            confirmed: false,
        }
    }

    pub fn confirm(&mut self, event: &OrderPlaced) -> anyhow::Result<()> {
        anyhow::ensure!(self.id == event.order_id, "order id mismatch");
        self.confirmed = true;
        Ok(())
    }
}

impl ListeningAggregate for OrderState {
    const TYPE: &'static str = "order";
}

#[derive(Default)]
pub struct OrderStore {
    orders: Mutex<HashMap<String, OrderState>>,
}

impl OrderStore {
    pub fn insert(&self, order: OrderState) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn get(&self, id: &str) -> Option<OrderState> {
        self.orders.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl TargetRepository<OrderState> for OrderStore {
    const NAME: &'static str = "orders";

    async fn load(&self, aggregate_id: &str) -> DispatchResult<Option<OrderState>> {
        Ok(self.get(aggregate_id))
    }

    async fn save(&self, aggregate: OrderState) -> DispatchResult<()> {
        self.insert(aggregate);
        Ok(())
    }
}

pub fn registry() -> ListenerRegistry {
    ListenerRegistry::builder()
        .service::<NotificationService>(|b| {
            b.on::<InventoryReserved>("notify_warehouse", NotificationService::notify_warehouse)
                .on::<InventoryReserved>("audit_reservation", NotificationService::audit_reservation)
                .on::<OrderPlaced>("notify_customer", NotificationService::notify_customer)
        })
        .service::<ReportingService>(|b| {
            b.on::<InventoryReserved>("count_reservation", ReportingService::count_reservation)
        })
        .aggregate::<OrderState, OrderStore>(|b| b.on::<OrderPlaced>("confirm", OrderState::confirm))
        .build()
        .unwrap()
}

/// 完整装配：注册表、探测器与消费者
pub struct World {
    pub notifications: Arc<NotificationService>,
    pub reporting: Arc<ReportingService>,
    pub orders: Arc<OrderStore>,
    pub detector: Arc<ExecutionContextDetector>,
    pub consumer: Arc<ExecutionContextConsumer>,
}

impl World {
    pub fn new() -> Self {
        let notifications = Arc::new(NotificationService::default());
        let reporting = Arc::new(ReportingService::default());
        let orders = Arc::new(OrderStore::default());

        let locator = Arc::new(InMemoryServiceLocator::new());
        locator.register_listener(notifications.clone());
        locator.register_listener(reporting.clone());
        locator.register_repository::<OrderState, _>(orders.clone());

        let detector = Arc::new(ExecutionContextDetector::new(
            Arc::new(registry()),
            locator,
        ));
        let consumer = Arc::new(ExecutionContextConsumer::new(detector.clone()));

        Self {
            notifications,
            reporting,
            orders,
            detector,
            consumer,
        }
    }

    pub fn message<E: DomainEvent>(&self, event: &E) -> EventMessage {
        EventMessage::from_event(event).unwrap()
    }
}
