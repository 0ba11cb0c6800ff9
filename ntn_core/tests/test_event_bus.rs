use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ntn_common::model::{Extras, Priority};
use ntn_core::event_bus::EventBusCore;

/// S6 — publish Normal, Low, Critical, High in order with zero handlers
/// registered, then register a handler. Expected dequeue order:
/// Critical, High, Normal, Low.
#[tokio::test]
async fn scenario_s6_priority_ordering_survives_no_handlers() {
    let bus = EventBusCore::new(1000, 1, 3);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    bus.publish("t", Extras::new(), "test", Priority::Normal, None, None).unwrap();
    bus.publish("t", Extras::new(), "test", Priority::Low, None, None).unwrap();
    bus.publish("t", Extras::new(), "test", Priority::Critical, None, None).unwrap();
    bus.publish("t", Extras::new(), "test", Priority::High, None, None).unwrap();

    let seen_clone = Arc::clone(&seen);
    bus.register_handler(
        "t",
        Arc::new(move |ev| {
            let seen = Arc::clone(&seen_clone);
            Box::pin(async move {
                seen.lock().unwrap().push(ev.priority);
                true
            })
        }),
        4,
        Duration::from_millis(200),
    );

    bus.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    bus.stop().await.unwrap();

    let order = seen.lock().unwrap().clone();
    assert_eq!(order, vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]);
}

#[tokio::test]
async fn publish_rejected_while_stopping() {
    let bus = EventBusCore::new(100, 1, 3);
    bus.start().await.unwrap();
    // Immediately request stop; a publish racing the transition must either
    // succeed (still Running) or be rejected (already Stopping) — it must
    // never panic or silently vanish.
    let stop_fut = bus.stop();
    let publish_result = bus.publish("t", Extras::new(), "test", Priority::Normal, None, None);
    stop_fut.await.unwrap();
    let _ = publish_result;
}

#[tokio::test]
async fn ttl_expired_event_is_never_delivered() {
    let bus = EventBusCore::new(100, 1, 3);
    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered_clone = Arc::clone(&delivered);

    bus.register_handler(
        "expiring",
        Arc::new(move |_ev| {
            let delivered = Arc::clone(&delivered_clone);
            Box::pin(async move {
                delivered.fetch_add(1, Ordering::SeqCst);
                true
            })
        }),
        1,
        Duration::from_millis(50),
    );

    bus.publish("expiring", Extras::new(), "test", Priority::Normal, None, Some(0.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    bus.stop().await.unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert!(bus.counters().expired >= 1);
}

#[tokio::test]
async fn handler_failure_is_retried_then_eventually_recorded() {
    let bus = EventBusCore::new(100, 1, 1);
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);

    bus.register_handler(
        "always_fails",
        Arc::new(move |_ev| {
            let attempts = Arc::clone(&attempts_clone);
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                false
            })
        }),
        1,
        Duration::from_millis(50),
    );

    bus.start().await.unwrap();
    bus.publish("always_fails", Extras::new(), "test", Priority::Normal, None, None).unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    bus.stop().await.unwrap();

    assert!(attempts.load(Ordering::SeqCst) >= 2);
    assert_eq!(bus.counters().failed, 1);
}

#[tokio::test]
async fn unregistered_handler_stops_receiving_events() {
    let bus = EventBusCore::new(100, 1, 0);
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);

    let handler_id = bus.register_handler(
        "t",
        Arc::new(move |_ev| {
            let hits = Arc::clone(&hits_clone);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                true
            })
        }),
        1,
        Duration::from_millis(50),
    );
    bus.unregister(handler_id);

    bus.start().await.unwrap();
    bus.publish("t", Extras::new(), "test", Priority::Normal, None, None).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.stop().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(bus.counters().failed, 1);
}
