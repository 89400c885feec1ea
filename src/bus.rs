//! `EventBus`: the public surface (spec.md §6). Wires the Demand Registry
//! (C2), Reconciler (C3), Stream Projector (C4), and Convenience Binder (C5)
//! together around a caller-supplied `SubscriptionManager` (C6).

use crate::key::{DataKind, SubscriberId, SubscriptionKey};
use crate::manager::SubscriptionManager;
use crate::registry::DemandRegistry;
use crate::stream;
use futures::Stream;
use log::debug;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The subscription registry and event bus for one process.
///
/// Cheaply clonable: clones share the same registry and manager, so any
/// clone observes the same subscriber state. This is the shape the teacher
/// crate gives its own managed marketdata types (a thin `Arc`-backed handle
/// plus a `.clone()` impl), so callers can hand the bus to multiple tasks
/// without wrapping it in an `Arc` themselves.
pub struct EventBus<M: SubscriptionManager> {
    registry: Arc<DemandRegistry>,
    manager: Arc<M>,
}

impl<M: SubscriptionManager> Clone for EventBus<M> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone(), manager: self.manager.clone() }
    }
}

impl<M: SubscriptionManager> EventBus<M> {
    pub fn new(manager: M) -> Self {
        Self::new_with(Arc::new(manager))
    }

    /// Like [`EventBus::new`], but takes an already-shared manager handle so
    /// the caller can keep its own `Arc` to inspect or drive it directly
    /// (the test suite uses this to assert on `update_subscriptions` calls).
    pub fn new_with(manager: Arc<M>) -> Self {
        Self { registry: Arc::new(DemandRegistry::new()), manager }
    }

    /// Replace `subscriber`'s holdings with exactly `target` (C3).
    ///
    /// Computes the add/remove delta against the subscriber's current
    /// holdings, applies it under a single write-lock critical section, and
    /// -- only if the global key union actually changed -- calls
    /// `SubscriptionManager::update_subscriptions` with the new union
    /// *before releasing the lock*, so no concurrent `change_subscriptions`
    /// can observe or announce a contradictory union in between (spec.md
    /// §4.3 step 5, §9).
    ///
    /// If the upstream call fails, the in-memory state has already been
    /// updated; the error is surfaced to the caller but nothing is rolled
    /// back (the next successful call reconciles).
    pub fn change_subscriptions(
        &self,
        subscriber: &SubscriberId,
        target: impl IntoIterator<Item = SubscriptionKey>,
    ) -> anyhow::Result<()> {
        let target = target.into_iter().collect();
        let manager = &self.manager;
        self.registry.change_subscriptions_locked(subscriber, &target, |all_keys| {
            debug!(
                "subscriber {subscriber} changed the global key union; {} keys now live",
                all_keys.len()
            );
            manager.update_subscriptions(all_keys)
        })
    }

    /// Equivalent to `change_subscriptions(subscriber, ∅)`.
    pub fn clear_subscriptions(&self, subscriber: &SubscriberId) -> anyhow::Result<()> {
        self.change_subscriptions(subscriber, std::iter::empty())
    }

    /// Add a single key to `subscriber`'s holdings, notifying upstream iff
    /// this was the key's first holder globally.
    pub fn add_subscription(
        &self,
        subscriber: &SubscriberId,
        key: SubscriptionKey,
    ) -> anyhow::Result<()> {
        let manager = &self.manager;
        self.registry
            .hold_and_notify(subscriber, &key, |all_keys| manager.update_subscriptions(all_keys))?;
        Ok(())
    }

    /// Remove a single key from `subscriber`'s holdings, notifying upstream
    /// iff this was the key's last holder globally.
    pub fn remove_subscription(
        &self,
        subscriber: &SubscriberId,
        key: &SubscriptionKey,
    ) -> anyhow::Result<()> {
        let manager = &self.manager;
        self.registry.release_and_notify(subscriber, key, |all_keys| {
            manager.update_subscriptions(all_keys)
        })?;
        Ok(())
    }

    /// Point-in-time copy of `subscriber`'s holdings.
    pub fn holdings(&self, subscriber: &SubscriberId) -> std::collections::HashSet<SubscriptionKey> {
        self.registry.holdings(subscriber).into_iter().collect()
    }

    /// The union of every subscriber's holdings.
    pub fn all_keys(&self) -> std::collections::HashSet<SubscriptionKey> {
        self.registry.all_keys().into_iter().collect()
    }

    fn get_stream(
        &self,
        subscriber: &SubscriberId,
        kind: DataKind,
    ) -> impl Stream<Item = crate::event::Event<M::Payload>> + Send + 'static {
        let keys = self.registry.holdings_of_kind(subscriber, kind);
        stream::project(self.manager.clone(), keys)
    }

    pub fn get_tickers(
        &self,
        subscriber: &SubscriberId,
    ) -> impl Stream<Item = crate::event::Event<M::Payload>> + Send + 'static {
        self.get_stream(subscriber, DataKind::Ticker)
    }

    pub fn get_order_books(
        &self,
        subscriber: &SubscriberId,
    ) -> impl Stream<Item = crate::event::Event<M::Payload>> + Send + 'static {
        self.get_stream(subscriber, DataKind::OrderBook)
    }

    pub fn get_open_orders(
        &self,
        subscriber: &SubscriberId,
    ) -> impl Stream<Item = crate::event::Event<M::Payload>> + Send + 'static {
        self.get_stream(subscriber, DataKind::OpenOrders)
    }

    pub fn get_trades(
        &self,
        subscriber: &SubscriberId,
    ) -> impl Stream<Item = crate::event::Event<M::Payload>> + Send + 'static {
        self.get_stream(subscriber, DataKind::Trades)
    }

    /// (C5) Hold `key` for `subscriber` and route its events to `callback`
    /// until `unregister_callbacks(subscriber)` is called or the bus is
    /// dropped. The resulting task handle is recorded under `subscriber` in
    /// the same locked table C2 guards, so registration and subscription
    /// changes can never race each other.
    pub fn register_callback<F, Fut>(
        &self,
        key: SubscriptionKey,
        subscriber: &SubscriberId,
        callback: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(crate::event::Event<M::Payload>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_subscription(subscriber, key.clone())?;
        let handle: JoinHandle<()> =
            stream::spawn_callback_driver(self.manager.clone(), key, callback);
        self.registry.push_callback_handle(subscriber, handle);
        Ok(())
    }

    /// Cancel every handle previously registered for `subscriber` via
    /// `register_callback`, then clear its subscriptions.
    pub fn unregister_callbacks(&self, subscriber: &SubscriberId) -> anyhow::Result<()> {
        for handle in self.registry.take_callback_handles(subscriber) {
            handle.abort();
        }
        self.clear_subscriptions(subscriber)
    }
}
