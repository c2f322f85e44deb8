#![allow(dead_code)]

use async_trait::async_trait;
use ddd_dispatch::domain_event::DomainEvent;
use ddd_dispatch::error::DispatchResult;
use ddd_dispatch::execution::{ExecutionContextConsumer, ExecutionContextDetector};
use ddd_dispatch::locator::InMemoryServiceLocator;
use ddd_dispatch::metadata::{
    EventListener, ListenerFuture, ListenerKind, ListenerRegistry, ListeningAggregate,
    TargetRepository,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub total_cents: u64,
}

impl OrderPlaced {
    pub fn new(order_id: &str, total_cents: u64) -> Self {
        Self {
            order_id: order_id.to_string(),
            total_cents,
        }
    }
}

impl DomainEvent for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";

    fn target_id(&self) -> Option<String> {
        Some(self.order_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDepleted {
    pub sku: String,
}

impl DomainEvent for StockDepleted {
    const EVENT_TYPE: &'static str = "StockDepleted";
}

/// 记录调用的服务；可切换为失败
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    rejected: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 只拒绝包含给定片段的调用
    pub fn reject(&self, needle: &str) {
        self.rejected.lock().unwrap().push(needle.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        anyhow::ensure!(!self.failing.load(Ordering::SeqCst), "{call} rejected");
        let rejected = self.rejected.lock().unwrap().iter().any(|n| call.contains(n.as_str()));
        anyhow::ensure!(!rejected, "{call} rejected");
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[derive(Default)]
pub struct NotificationService(pub Recorder);

impl EventListener for NotificationService {
    const NAME: &'static str = "notification";
    const KIND: ListenerKind = ListenerKind::OutboundAdapter;
}

impl NotificationService {
    fn order_confirmation<'a>(&'a self, event: &'a OrderPlaced) -> ListenerFuture<'a> {
        Box::pin(async move { self.0.record(format!("confirm:{}", event.order_id)) })
    }

    fn restock_alert<'a>(&'a self, event: &'a StockDepleted) -> ListenerFuture<'a> {
        Box::pin(async move { self.0.record(format!("restock:{}", event.sku)) })
    }
}

#[derive(Default)]
pub struct PurchasingService(pub Recorder);

impl EventListener for PurchasingService {
    const NAME: &'static str = "purchasing";
    const KIND: ListenerKind = ListenerKind::DomainService;
}

impl PurchasingService {
    fn reorder<'a>(&'a self, event: &'a StockDepleted) -> ListenerFuture<'a> {
        Box::pin(async move { self.0.record(format!("reorder:{}", event.sku)) })
    }
}

#[derive(Default)]
pub struct SalesReport(pub Recorder);

impl EventListener for SalesReport {
    const NAME: &'static str = "sales_report";
    const KIND: ListenerKind = ListenerKind::QueryHandler;
}

impl SalesReport {
    fn count_depletion<'a>(&'a self, event: &'a StockDepleted) -> ListenerFuture<'a> {
        Box::pin(async move { self.0.record(format!("depleted:{}", event.sku)) })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub placed_total: Option<u64>,
}

impl ListeningAggregate for Order {
    const TYPE: &'static str = "order";
}

impl Order {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            placed_total: None,
        }
    }

    fn on_placed(&mut self, event: &OrderPlaced) -> anyhow::Result<()> {
        self.placed_total = Some(event.total_cents);
        Ok(())
    }
}

#[derive(Default)]
pub struct OrderRepository {
    orders: Mutex<HashMap<String, Order>>,
}

impl OrderRepository {
    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl TargetRepository<Order> for OrderRepository {
    const NAME: &'static str = "order_repository";

    async fn load(&self, id: &str) -> DispatchResult<Option<Order>> {
        Ok(self.get(id))
    }

    async fn save(&self, order: Order) -> DispatchResult<()> {
        self.insert(order);
        Ok(())
    }
}

pub struct App {
    pub notifications: Arc<NotificationService>,
    pub purchasing: Arc<PurchasingService>,
    pub sales: Arc<SalesReport>,
    pub orders: Arc<OrderRepository>,
    pub detector: Arc<ExecutionContextDetector>,
    pub consumer: Arc<ExecutionContextConsumer>,
}

impl App {
    pub fn new() -> Self {
        let registry = ListenerRegistry::builder()
            .service::<NotificationService>(|b| {
                b.on::<OrderPlaced>("order_confirmation", NotificationService::order_confirmation)
                    .on::<StockDepleted>("restock_alert", NotificationService::restock_alert)
            })
            .service::<PurchasingService>(|b| {
                b.on::<StockDepleted>("reorder", PurchasingService::reorder)
            })
            .service::<SalesReport>(|b| {
                b.on::<StockDepleted>("count_depletion", SalesReport::count_depletion)
            })
            .aggregate::<Order, OrderRepository>(|b| b.on::<OrderPlaced>("on_placed", Order::on_placed))
            .build()
            .unwrap();

        let notifications = Arc::new(NotificationService::default());
        let purchasing = Arc::new(PurchasingService::default());
        let sales = Arc::new(SalesReport::default());
        let orders = Arc::new(OrderRepository::default());

        let locator = Arc::new(InMemoryServiceLocator::new());
        locator.register_listener(notifications.clone());
        locator.register_listener(purchasing.clone());
        locator.register_listener(sales.clone());
        locator.register_repository::<Order, _>(orders.clone());

        let detector = Arc::new(ExecutionContextDetector::new(Arc::new(registry), locator));
        let consumer = Arc::new(ExecutionContextConsumer::new(detector.clone()));

        Self {
            notifications,
            purchasing,
            sales,
            orders,
            detector,
            consumer,
        }
    }
}
