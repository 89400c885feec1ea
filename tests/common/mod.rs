//! Shared test fixtures: an in-memory `SubscriptionManager` that records
//! every `update_subscriptions` call and lets a test push synthetic events
//! into any key's stream on demand.

use futures::stream::BoxStream;
use fxhash::{FxHashMap, FxHashSet};
use marketdata_bus::{DataKind, Event, InstrumentSpec, SubscriptionKey, SubscriptionManager};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub fn key(exchange: &str, base: &str, counter: &str, kind: DataKind) -> SubscriptionKey {
    let instrument = InstrumentSpec::new(exchange, base, counter).unwrap();
    SubscriptionKey::new(instrument, kind)
}

pub fn ticker(base: &str, counter: &str) -> SubscriptionKey {
    key("COINBASE", base, counter, DataKind::Ticker)
}

#[derive(Default)]
pub struct MockSubscriptionManager {
    calls: Mutex<Vec<FxHashSet<SubscriptionKey>>>,
    senders: Mutex<FxHashMap<SubscriptionKey, mpsc::UnboundedSender<Event<u64>>>>,
}

impl MockSubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<FxHashSet<SubscriptionKey>> {
        self.calls.lock().last().cloned()
    }

    pub fn all_calls(&self) -> Vec<FxHashSet<SubscriptionKey>> {
        self.calls.lock().clone()
    }

    /// Push one synthetic event into `key`'s stream. No-ops if nobody has
    /// called `stream(key)` yet (mirrors a real feed with no listeners).
    pub fn push_event(&self, key: &SubscriptionKey, seq: u64) {
        if let Some(tx) = self.senders.lock().get(key) {
            let event = Event::Ticker(key.instrument.clone(), seq);
            let _ = tx.send(event);
        }
    }
}

impl SubscriptionManager for MockSubscriptionManager {
    type Payload = u64;

    fn update_subscriptions(&self, keys: &FxHashSet<SubscriptionKey>) -> anyhow::Result<()> {
        self.calls.lock().push(keys.clone());
        Ok(())
    }

    fn stream(&self, key: SubscriptionKey) -> BoxStream<'static, Event<u64>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(key, tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}
