//! Demand Registry (C2): a concurrent mapping from Subscription Key to
//! refcount, plus the bidirectional subscriber -> keys index, plus (C5) the
//! subscriber -> callback-handle table. All three live behind one
//! `parking_lot::RwLock` so the "refcount == number of holders" invariant
//! never goes briefly false between two separate locks (spec.md §9).

use crate::key::{SubscriberId, SubscriptionKey};
use fxhash::{FxHashMap, FxHashSet};
use log::warn;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

/// Result of `hold`: whether this was the key's first holder globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldTransition {
    /// The key had no holders before this call; upstream must now be told.
    FirstGlobalHolder,
    /// The key already had at least one other holder.
    AdditionalHolder,
    /// This subscriber already held the key; no mutation occurred.
    AlreadyHeld,
}

/// Result of `release`: whether this was the key's last holder globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTransition {
    /// The refcount reached zero; the entry was removed.
    LastGlobalHolder,
    /// Other subscribers still hold the key.
    StillHeld,
    /// This subscriber did not hold the key; no mutation occurred.
    NotHeld,
}

#[derive(Default)]
struct Inner {
    holdings: FxHashMap<SubscriberId, FxHashSet<SubscriptionKey>>,
    refcounts: FxHashMap<SubscriptionKey, usize>,
    callback_handles: FxHashMap<SubscriberId, Vec<JoinHandle<()>>>,
}

/// The registry itself. Cheaply clonable (wraps an `Arc`-free `RwLock`
/// directly, since this type is always held behind the bus's own `Arc`).
#[derive(Default)]
pub struct DemandRegistry {
    inner: RwLock<Inner>,
}

impl DemandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` to `subscriber`'s holdings. Atomic with respect to every
    /// other registry operation.
    pub fn hold(&self, subscriber: &SubscriberId, key: &SubscriptionKey) -> HoldTransition {
        let mut inner = self.inner.write();
        hold_locked(&mut inner, subscriber, key)
    }

    /// Remove `key` from `subscriber`'s holdings. Atomic with respect to
    /// every other registry operation; a stale zero refcount never
    /// persists because the entry is removed in the same critical section
    /// that observes the count hitting zero.
    pub fn release(
        &self,
        subscriber: &SubscriberId,
        key: &SubscriptionKey,
    ) -> ReleaseTransition {
        let mut inner = self.inner.write();
        release_locked(&mut inner, subscriber, key)
    }

    /// Add `key` to `subscriber`'s holdings and, if this was the key's
    /// first holder globally, call `notify` with the new union -- all
    /// inside the same write-lock critical section, so no concurrent
    /// writer can observe or announce a union `notify` hasn't heard about
    /// yet (spec.md §4.3 step 5, §9).
    pub(crate) fn hold_and_notify(
        &self,
        subscriber: &SubscriberId,
        key: &SubscriptionKey,
        notify: impl FnOnce(&FxHashSet<SubscriptionKey>) -> anyhow::Result<()>,
    ) -> anyhow::Result<HoldTransition> {
        let mut inner = self.inner.write();
        let transition = hold_locked(&mut inner, subscriber, key);
        if transition == HoldTransition::FirstGlobalHolder {
            let all_keys: FxHashSet<SubscriptionKey> = inner.refcounts.keys().cloned().collect();
            notify(&all_keys)?;
        }
        Ok(transition)
    }

    /// Remove `key` from `subscriber`'s holdings and, if this was the
    /// key's last holder globally, call `notify` with the new union --
    /// same locked-notify discipline as [`Self::hold_and_notify`].
    pub(crate) fn release_and_notify(
        &self,
        subscriber: &SubscriberId,
        key: &SubscriptionKey,
        notify: impl FnOnce(&FxHashSet<SubscriptionKey>) -> anyhow::Result<()>,
    ) -> anyhow::Result<ReleaseTransition> {
        let mut inner = self.inner.write();
        let transition = release_locked(&mut inner, subscriber, key);
        if transition == ReleaseTransition::LastGlobalHolder {
            let all_keys: FxHashSet<SubscriptionKey> = inner.refcounts.keys().cloned().collect();
            notify(&all_keys)?;
        }
        Ok(transition)
    }

    /// Point-in-time copy of `subscriber`'s holdings.
    pub fn holdings(&self, subscriber: &SubscriberId) -> FxHashSet<SubscriptionKey> {
        let inner = self.inner.read();
        inner.holdings.get(subscriber).cloned().unwrap_or_default()
    }

    /// Point-in-time copy of `subscriber`'s holdings of one data kind.
    pub fn holdings_of_kind(
        &self,
        subscriber: &SubscriberId,
        kind: crate::key::DataKind,
    ) -> Vec<SubscriptionKey> {
        let inner = self.inner.read();
        inner
            .holdings
            .get(subscriber)
            .into_iter()
            .flatten()
            .filter(|k| k.kind == kind)
            .cloned()
            .collect()
    }

    /// The union of every subscriber's holdings: what the Subscription
    /// Manager should be driving right now.
    pub fn all_keys(&self) -> FxHashSet<SubscriptionKey> {
        let inner = self.inner.read();
        inner.refcounts.keys().cloned().collect()
    }

    pub fn refcount(&self, key: &SubscriptionKey) -> usize {
        let inner = self.inner.read();
        inner.refcounts.get(key).copied().unwrap_or(0)
    }

    /// Record a cancellation handle under `subscriber` (C5 binder table).
    pub fn push_callback_handle(&self, subscriber: &SubscriberId, handle: JoinHandle<()>) {
        let mut inner = self.inner.write();
        inner.callback_handles.entry(subscriber.clone()).or_default().push(handle);
    }

    /// Remove and return every cancellation handle previously registered
    /// for `subscriber`.
    pub fn take_callback_handles(&self, subscriber: &SubscriberId) -> Vec<JoinHandle<()>> {
        let mut inner = self.inner.write();
        inner.callback_handles.remove(subscriber).unwrap_or_default()
    }

    /// Apply a whole target-set replacement atomically: one write-lock
    /// acquisition for the entire add/remove batch, and, if the global key
    /// union changed, `notify` is called with the new union *before the
    /// guard is dropped* -- so a concurrent `change_subscriptions` can
    /// never interleave a contradictory update, and the upstream call is
    /// linearized with the state change it reports (spec.md §4.3 step 5,
    /// §9).
    pub(crate) fn change_subscriptions_locked(
        &self,
        subscriber: &SubscriberId,
        target: &FxHashSet<SubscriptionKey>,
        notify: impl FnOnce(&FxHashSet<SubscriptionKey>) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        let current = inner.holdings.get(subscriber).cloned().unwrap_or_default();
        let to_remove: Vec<SubscriptionKey> =
            current.difference(target).cloned().collect();
        let to_add: Vec<SubscriptionKey> = target.difference(&current).cloned().collect();

        let mut any_first = false;
        let mut any_last = false;

        for key in &to_remove {
            match release_locked(&mut inner, subscriber, key) {
                ReleaseTransition::LastGlobalHolder => any_last = true,
                ReleaseTransition::StillHeld | ReleaseTransition::NotHeld => {}
            }
        }
        for key in &to_add {
            match hold_locked(&mut inner, subscriber, key) {
                HoldTransition::FirstGlobalHolder => any_first = true,
                HoldTransition::AdditionalHolder | HoldTransition::AlreadyHeld => {}
            }
        }

        if any_first || any_last {
            let all_keys: FxHashSet<SubscriptionKey> = inner.refcounts.keys().cloned().collect();
            notify(&all_keys)?;
        }

        Ok(())
    }
}

fn hold_locked(
    inner: &mut Inner,
    subscriber: &SubscriberId,
    key: &SubscriptionKey,
) -> HoldTransition {
    let holdings = inner.holdings.entry(subscriber.clone()).or_default();
    if !holdings.insert(key.clone()) {
        return HoldTransition::AlreadyHeld;
    }
    let count = inner.refcounts.entry(key.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        HoldTransition::FirstGlobalHolder
    } else {
        HoldTransition::AdditionalHolder
    }
}

fn release_locked(
    inner: &mut Inner,
    subscriber: &SubscriberId,
    key: &SubscriptionKey,
) -> ReleaseTransition {
    let Some(holdings) = inner.holdings.get_mut(subscriber) else {
        warn!("release({subscriber}, {key}): subscriber held nothing");
        return ReleaseTransition::NotHeld;
    };
    if !holdings.remove(key) {
        warn!("release({subscriber}, {key}): subscriber did not hold this key");
        return ReleaseTransition::NotHeld;
    }
    if holdings.is_empty() {
        inner.holdings.remove(subscriber);
    }
    match inner.refcounts.get_mut(key) {
        Some(count) if *count > 1 => {
            *count -= 1;
            ReleaseTransition::StillHeld
        }
        Some(_) => {
            inner.refcounts.remove(key);
            ReleaseTransition::LastGlobalHolder
        }
        None => {
            warn!("release({subscriber}, {key}): held by subscriber but refcount was missing");
            ReleaseTransition::LastGlobalHolder
        }
    }
}
