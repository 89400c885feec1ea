//! The Subscription Manager interface (spec.md §6, consumed). This is the
//! external collaborator that actually talks to exchanges; the bus only ever
//! calls through this trait, never concretely.

use crate::event::Event;
use crate::key::SubscriptionKey;
use futures::stream::BoxStream;
use fxhash::FxHashSet;

/// Implemented by whatever owns the real exchange connections.
///
/// `update_subscriptions` is called from inside the bus's write-lock
/// critical section (spec.md §4.3 step 5), so it **must** return promptly:
/// do real reconnection work on a background task or channel, not here.
/// It must also be idempotent when called twice with the same set.
///
/// `stream` just has to hand back a lazy, independently-subscribable event
/// sequence for one key; the manager is assumed to dedupe the underlying
/// exchange connection itself, the bus only dedupes at the key level.
pub trait SubscriptionManager: Send + Sync + 'static {
    /// Opaque event payload type, defined entirely by the implementation.
    type Payload: Clone + Send + Sync + 'static;

    fn update_subscriptions(&self, keys: &FxHashSet<SubscriptionKey>) -> anyhow::Result<()>;

    fn stream(&self, key: SubscriptionKey) -> BoxStream<'static, Event<Self::Payload>>;
}
