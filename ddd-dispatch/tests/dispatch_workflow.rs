mod common;

use common::*;
use ddd_dispatch::domain_event::{EventContext, EventMessage};
use ddd_dispatch::error::DispatchError;
use ddd_dispatch::execution::{EventConsumer, ExecutionContext, TargetExecutionContext};
use ddd_dispatch::publishing::{
    EventPublisherExt, InMemoryTransactionBoundary, TransactionBoundary, TransactionalPublisher,
};
use std::sync::Arc;

#[test]
fn targeted_event_detects_aggregate_and_service() {
    let app = App::new();
    let event = EventMessage::from_event(&OrderPlaced::new("42", 1999)).unwrap();

    let contexts = app.detector.detect(&event).unwrap();
    assert_eq!(contexts.len(), 2);
    assert!(matches!(contexts[0], ExecutionContext::Aggregate(_)));
    assert_eq!(contexts[1].target().to_string(), "notification.order_confirmation");
}

#[tokio::test]
async fn failing_notification_does_not_affect_aggregate() {
    let app = App::new();
    app.orders.insert(Order::new("42"));
    app.notifications.0.set_failing(true);
    let event = EventMessage::from_event(&OrderPlaced::new("42", 1999)).unwrap();

    let results = app.consumer.consume(&event).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert_eq!(app.orders.get("42").unwrap().placed_total, Some(1999));
}

#[tokio::test]
async fn result_count_matches_listening_methods() {
    let app = App::new();
    let event = EventMessage::from_event(&StockDepleted { sku: "SKU-9".into() }).unwrap();

    let results = app.consumer.consume(&event).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(app.notifications.0.calls(), vec!["restock:SKU-9"]);
    assert_eq!(app.purchasing.0.calls(), vec!["reorder:SKU-9"]);
    assert_eq!(app.sales.0.calls(), vec!["depleted:SKU-9"]);
}

#[tokio::test]
async fn unknown_order_is_reported_as_failed_result() {
    let app = App::new();
    let event = EventMessage::from_event(&OrderPlaced::new("404", 10)).unwrap();

    let results = app.consumer.consume(&event).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(!results[0].is_success());
    assert!(results[1].is_success());
}

#[tokio::test]
async fn targeted_consume_is_idempotent_in_outcome() {
    let app = App::new();
    app.orders.insert(Order::new("42"));
    let event = EventMessage::from_event(&OrderPlaced::new("42", 500)).unwrap();
    let target = TargetExecutionContext::new("order", "on_placed");

    let first = app.consumer.consume_target(&event, &target).await.unwrap();
    let second = app.consumer.consume_target(&event, &target).await.unwrap();
    assert_eq!(first.is_success(), second.is_success());
    assert!(app.notifications.0.calls().is_empty());
}

#[tokio::test]
async fn transactional_publish_defers_until_commit() {
    let app = App::new();
    let tx = Arc::new(InMemoryTransactionBoundary::new());
    let publisher = TransactionalPublisher::builder()
        .consumer(app.consumer.clone())
        .transaction_boundary(tx.clone())
        .build();

    tx.begin().unwrap();
    publisher
        .publish_event(&StockDepleted { sku: "SKU-1".into() })
        .await
        .unwrap();
    assert!(tx.is_active().unwrap());
    assert!(app.purchasing.0.calls().is_empty());

    tx.commit().await.unwrap();
    assert_eq!(app.purchasing.0.calls(), vec!["reorder:SKU-1"]);

    // 再次提交不会重复分发
    tx.begin().unwrap();
    tx.commit().await.unwrap();
    assert_eq!(app.purchasing.0.calls().len(), 1);
}

#[tokio::test]
async fn transactional_publish_without_transaction_is_rejected() {
    let app = App::new();
    let publisher = TransactionalPublisher::new(
        app.consumer.clone(),
        Arc::new(InMemoryTransactionBoundary::new()),
    );

    let err = publisher
        .publish_event(&StockDepleted { sku: "SKU-1".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoActiveTransaction { ref event_type } if event_type == "StockDepleted"));
}

#[tokio::test]
async fn pass_through_event_is_visible_before_rollback() {
    let app = App::new();
    let tx = Arc::new(InMemoryTransactionBoundary::new());
    let publisher = TransactionalPublisher::new(app.consumer.clone(), tx.clone())
        .with_pass_through(["StockDepleted"]);

    tx.begin().unwrap();
    let event = EventMessage::from_event(&StockDepleted { sku: "SKU-2".into() })
        .unwrap()
        .with_context(EventContext::builder().correlation_id("req-1".into()).build());
    ddd_dispatch::publishing::EventPublisher::publish(&publisher, event)
        .await
        .unwrap();
    assert_eq!(app.sales.0.calls(), vec!["depleted:SKU-2"]);

    tx.rollback().unwrap();
    assert_eq!(app.sales.0.calls().len(), 1);
}
