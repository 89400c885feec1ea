//! End-to-end scenarios from spec.md §8.

mod common;

use common::{ticker, MockSubscriptionManager};
use futures::StreamExt;
use marketdata_bus::{EventBus, SubscriberId};
use std::sync::Arc;
use std::time::Duration;

fn sub(id: &str) -> SubscriberId {
    SubscriberId::new(id).unwrap()
}

#[tokio::test]
async fn single_subscriber_single_key() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let k1 = ticker("BTC", "USD");

    bus.change_subscriptions(&sub("A"), [k1.clone()]).unwrap();

    assert_eq!(bus.all_keys(), [k1.clone()].into_iter().collect());
    assert_eq!(manager.call_count(), 1);
    assert_eq!(manager.last_call().unwrap(), [k1].into_iter().collect());
}

#[tokio::test]
async fn two_subscribers_sharing_a_key() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let k1 = ticker("BTC", "USD");

    bus.change_subscriptions(&sub("A"), [k1.clone()]).unwrap();
    bus.change_subscriptions(&sub("B"), [k1.clone()]).unwrap();

    // only A's change touched the global union; B's didn't.
    assert_eq!(manager.call_count(), 1);
}

#[tokio::test]
async fn last_holder_departure() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let k1 = ticker("BTC", "USD");

    bus.change_subscriptions(&sub("A"), [k1.clone()]).unwrap();
    bus.change_subscriptions(&sub("B"), [k1.clone()]).unwrap();
    assert_eq!(manager.call_count(), 1);

    bus.clear_subscriptions(&sub("A")).unwrap();
    // B still holds it; no upstream call.
    assert_eq!(manager.call_count(), 1);
    assert_eq!(bus.all_keys(), [k1].into_iter().collect());

    bus.clear_subscriptions(&sub("B")).unwrap();
    assert_eq!(manager.call_count(), 2);
    assert!(manager.last_call().unwrap().is_empty());
    assert!(bus.all_keys().is_empty());
}

#[tokio::test]
async fn disjoint_swap() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let k1 = ticker("BTC", "USD");
    let k2 = ticker("ETH", "USD");
    let k3 = ticker("SOL", "USD");

    bus.change_subscriptions(&sub("A"), [k1.clone(), k2.clone()]).unwrap();
    bus.change_subscriptions(&sub("A"), [k2.clone(), k3.clone()]).unwrap();

    assert_eq!(manager.call_count(), 2);
    assert_eq!(bus.all_keys(), [k2, k3].into_iter().collect());
}

#[tokio::test]
async fn idempotent_change_issues_no_second_notification() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let k1 = ticker("BTC", "USD");

    bus.change_subscriptions(&sub("A"), [k1.clone()]).unwrap();
    bus.change_subscriptions(&sub("A"), [k1]).unwrap();

    assert_eq!(manager.call_count(), 1);
}

#[tokio::test]
async fn stream_projection_is_a_snapshot_at_call_time() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let a = sub("A");
    let k1 = ticker("BTC", "USD");
    let k2 = ticker("ETH", "USD");
    let k3 = ticker("SOL", "USD");

    bus.change_subscriptions(&a, [k1.clone(), k2.clone()]).unwrap();
    let mut stream = Box::pin(bus.get_tickers(&a));

    let poll_task = tokio::spawn(async move {
        let mut seen = std::collections::HashSet::new();
        while seen.len() < 2 {
            if let Some(event) = stream.next().await {
                seen.insert(event.instrument().to_string());
            } else {
                break;
            }
        }
        seen
    });

    // give the spawned feeder/relay tasks a chance to call `stream(key)`
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.push_event(&k1, 1);
    manager.push_event(&k2, 1);

    let seen = tokio::time::timeout(Duration::from_secs(1), poll_task).await.unwrap().unwrap();
    assert!(seen.contains(&k1.instrument.to_string()));
    assert!(seen.contains(&k2.instrument.to_string()));

    // a later change does not retroactively alter the stream already
    // returned above: K3 was never part of its snapshot.
    bus.change_subscriptions(&a, [k3.clone()]).unwrap();
    assert_eq!(bus.holdings(&a), [k3].into_iter().collect());
}

#[tokio::test]
async fn get_stream_for_unheld_kind_completes_immediately() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager);
    let a = sub("A");
    let mut stream = Box::pin(bus.get_trades(&a));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn register_callback_routes_events_and_unregister_tears_down() {
    let manager = Arc::new(MockSubscriptionManager::new());
    let bus = EventBus::new_with(manager.clone());
    let a = sub("A");
    let k1 = ticker("BTC", "USD");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    bus.register_callback(k1.clone(), &a, move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
        }
    })
    .unwrap();

    assert_eq!(bus.holdings(&a), [k1.clone()].into_iter().collect());

    // give the callback driver a chance to open the upstream stream
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.push_event(&k1, 1);
    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(received.is_some());

    bus.unregister_callbacks(&a).unwrap();
    assert!(bus.holdings(&a).is_empty());
}
