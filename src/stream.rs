//! Stream Projector (C4): synthesizes a merged event stream for one
//! subscriber/kind pair from the per-key streams the subscriber currently
//! holds, coalescing each upstream to its latest value per key under
//! consumer backpressure.

use crate::event::Event;
use crate::key::SubscriptionKey;
use crate::manager::SubscriptionManager;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use log::error;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

/// Aborts every task it holds when dropped. Backs the "release upstream
/// per-key streams promptly" requirement on stream cancellation/completion
/// (spec.md §4.4) without the caller having to remember to clean up.
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Build the lazy, snapshot-at-call-time merged stream for `keys`.
///
/// The snapshot itself (`keys`) is taken by the caller before this function
/// runs; nothing here touches the registry. No upstream subscription is
/// opened, and no task is spawned, until the returned stream is first
/// polled — satisfying "lazy: no events flow until a consumer begins
/// pulling."
///
/// Latest-wins backpressure is enforced at the true consumer boundary: each
/// key's feeder only ever writes into a `watch` channel, and the merged
/// stream polls those `watch` channels directly (via `WatchStream`, merged
/// with `select_all`) rather than draining them into an intermediate
/// unbounded queue. A consumer that stops polling therefore stalls the
/// whole merge -- nothing buffers on its behalf -- and once it resumes, a
/// key that changed many times while it was away yields only the latest
/// value for that key, never a backlog.
pub fn project<M: SubscriptionManager>(
    manager: Arc<M>,
    keys: Vec<SubscriptionKey>,
) -> impl futures::Stream<Item = Event<M::Payload>> + Send + 'static {
    async_stream::stream! {
        if keys.is_empty() {
            // Open Question in spec.md §9, resolved: an empty snapshot
            // completes immediately on first pull.
            return;
        }

        let mut tasks = Vec::with_capacity(keys.len());
        let mut watch_streams: Vec<BoxStream<'static, Event<M::Payload>>> =
            Vec::with_capacity(keys.len());

        for key in keys {
            let upstream = manager.stream(key.clone());
            let (watch_tx, watch_rx) = watch::channel::<Option<Event<M::Payload>>>(None);

            // Feeder: drains the upstream stream as fast as it produces
            // items, regardless of whether the consumer is currently
            // polling the merged stream. `watch` only ever retains the
            // latest value, so a feeder that outruns the consumer silently
            // drops everything but the newest item for this key -- exactly
            // the latest-wins policy, scoped per upstream so one slow key
            // can't starve others.
            let feeder_key = key.clone();
            let feeder: JoinHandle<()> = tokio::spawn(async move {
                let mut upstream = upstream;
                while let Some(event) = upstream.next().await {
                    if watch_tx.send(Some(event)).is_err() {
                        break;
                    }
                }
                let _ = feeder_key;
            });
            tasks.push(feeder);

            // `WatchStream` yields the channel's current value on first
            // poll and thereafter once per `changed()`; the initial `None`
            // sentinel (no event yet) is filtered out rather than yielded.
            let watch_stream =
                WatchStream::new(watch_rx).filter_map(|event| async move { event }).boxed();
            watch_streams.push(watch_stream);
        }

        let _guard = TaskGuard(tasks);
        let mut merged = futures::stream::select_all(watch_streams);
        while let Some(event) = merged.next().await {
            yield event;
        }
    }
}

/// Used by the convenience binder (C5): like [`project`], but for a single
/// key, returned eagerly rather than merged — the binder only ever tracks
/// one key per registration.
pub fn project_one<M: SubscriptionManager>(
    manager: Arc<M>,
    key: SubscriptionKey,
) -> impl futures::Stream<Item = Event<M::Payload>> + Send + 'static {
    project(manager, vec![key])
}

/// Isolated teardown for a single callback-driven subscription (spec.md §7,
/// `ConsumerError`): a panicking callback is caught, logged, and tears down
/// only this one registration; other subscribers are unaffected.
pub fn spawn_callback_driver<M, F, Fut>(
    manager: Arc<M>,
    key: SubscriptionKey,
    mut callback: F,
) -> JoinHandle<()>
where
    M: SubscriptionManager,
    F: FnMut(Event<M::Payload>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = Box::pin(project_one(manager, key.clone()));
        while let Some(event) = stream.next().await {
            if AssertUnwindSafe(callback(event)).catch_unwind().await.is_err() {
                error!("callback for {key} panicked, tearing down this subscription only");
                break;
            }
        }
    })
}
