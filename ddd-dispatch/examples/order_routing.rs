/// 订单事件路由示例
/// 展示：注册监听者 -> 事务内发布（提交后分发）-> 按事件类型路由到 Outbox -> 轮询投递
use async_trait::async_trait;
use ddd_dispatch::channel::{ChannelFactory, EventRouter, TransportChannelFactory};
use ddd_dispatch::config::ConfigLoader;
use ddd_dispatch::domain_event::DomainEvent;
use ddd_dispatch::error::DispatchResult;
use ddd_dispatch::execution::{ExecutionContextConsumer, ExecutionContextDetector};
use ddd_dispatch::locator::InMemoryServiceLocator;
use ddd_dispatch::metadata::{
    EventListener, ListenerFuture, ListenerKind, ListenerRegistry, ListeningAggregate,
    TargetRepository,
};
use ddd_dispatch::outbox::{InMemoryOutboxStore, OutboxPoller, OutboxPublisher};
use ddd_dispatch::publishing::{
    EventPublisherExt, ImmediatePublisher, InMemoryTransactionBoundary, TransactionalPublisher,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// 领域事件
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
    total_cents: u64,
}

impl DomainEvent for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";

    fn target_id(&self) -> Option<String> {
        Some(self.order_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CartAbandoned {
    customer: String,
}

impl DomainEvent for CartAbandoned {
    const EVENT_TYPE: &'static str = "CartAbandoned";
}

// ============================================================================
// 监听者
// ============================================================================

struct Mailer;

impl EventListener for Mailer {
    const NAME: &'static str = "mailer";
    const KIND: ListenerKind = ListenerKind::OutboundAdapter;
}

impl Mailer {
    fn order_receipt<'a>(&'a self, event: &'a OrderPlaced) -> ListenerFuture<'a> {
        Box::pin(async move {
            println!("[mailer] receipt for order {}", event.order_id);
            Ok(())
        })
    }

    fn cart_reminder<'a>(&'a self, event: &'a CartAbandoned) -> ListenerFuture<'a> {
        Box::pin(async move {
            println!("[mailer] reminder for {}", event.customer);
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
struct Order {
    id: String,
    paid_cents: u64,
}

impl ListeningAggregate for Order {
    const TYPE: &'static str = "order";
}

impl Order {
    fn record_placement(&mut self, event: &OrderPlaced) -> anyhow::Result<()> {
        self.paid_cents = event.total_cents;
        Ok(())
    }
}

#[derive(Default)]
struct Orders {
    inner: Mutex<HashMap<String, Order>>,
}

#[async_trait]
impl TargetRepository<Order> for Orders {
    const NAME: &'static str = "orders";

    async fn load(&self, id: &str) -> DispatchResult<Option<Order>> {
        Ok(self.inner.lock().unwrap().get(id).cloned())
    }

    async fn save(&self, order: Order) -> DispatchResult<()> {
        println!("[orders] saved order {} ({} cents)", order.id, order.paid_cents);
        self.inner.lock().unwrap().insert(order.id.clone(), order);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ConfigLoader::new().load_from_str(
        r#"
        [router]
        default_channel = "local"
        routes = { OrderPlaced = "outbox" }

        [outbox]
        min_delay = 0

        [poller]
        initial_delay = 0
        period = 100
        "#,
    )?;

    // 1) 元数据与实例
    let registry = ListenerRegistry::builder()
        .service::<Mailer>(|b| {
            b.on::<OrderPlaced>("order_receipt", Mailer::order_receipt)
                .on::<CartAbandoned>("cart_reminder", Mailer::cart_reminder)
        })
        .aggregate::<Order, Orders>(|b| {
            b.on::<OrderPlaced>("record_placement", Order::record_placement)
        })
        .build()?;

    let orders = Arc::new(Orders::default());
    orders.inner.lock().unwrap().insert(
        "A-100".into(),
        Order {
            id: "A-100".into(),
            paid_cents: 0,
        },
    );

    let locator = Arc::new(InMemoryServiceLocator::new());
    locator.register_listener(Arc::new(Mailer));
    locator.register_repository::<Order, _>(orders.clone());

    let detector = Arc::new(ExecutionContextDetector::new(Arc::new(registry), locator));
    let consumer = Arc::new(ExecutionContextConsumer::new(detector.clone()));

    // 2) 事务内发布：提交后才分发
    let tx = Arc::new(InMemoryTransactionBoundary::new());
    let transactional = TransactionalPublisher::from_config(consumer.clone(), tx.clone(), &config);
    tx.begin()?;
    transactional
        .publish_event(&CartAbandoned {
            customer: "ada".into(),
        })
        .await?;
    println!("-- committing");
    tx.commit().await?;

    // 3) 路由：OrderPlaced 走 Outbox，其余走进程内
    let store = Arc::new(InMemoryOutboxStore::new(config.retry));
    let local = TransportChannelFactory::builder()
        .transport("in-process")
        .publisher(Arc::new(ImmediatePublisher::new(consumer.clone())))
        .consumer(consumer.clone())
        .build();
    let outbox = TransportChannelFactory::builder()
        .transport("outbox")
        .publisher(Arc::new(
            OutboxPublisher::builder()
                .store(store.clone())
                .detector(detector)
                .config(config.outbox)
                .build(),
        ))
        .build();
    let router = EventRouter::from_config(
        &config.router,
        [
            local.processing_channel("local")?,
            outbox.publish_only_channel("outbox")?,
        ],
    )?;

    router
        .publish_event(&OrderPlaced {
            order_id: "A-100".into(),
            total_cents: 4200,
        })
        .await?;
    println!("-- {} outbox entries scheduled", store.entries().len());

    // 4) 后台轮询投递
    let poller = OutboxPoller::with_consumer(store.clone(), consumer, config.poller)?;
    poller.start()?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    poller.stop()?;

    for entry in store.entries() {
        println!(
            "[outbox] {} -> {} ({})",
            entry.message().event().event_type(),
            entry
                .message()
                .target()
                .map(|t| t.to_string())
                .unwrap_or_default(),
            entry.state()
        );
    }
    Ok(())
}
