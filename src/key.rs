//! Subscription Key (C1): the immutable unit of demand and deduplication.

use crate::error::BusError;
use std::fmt;
use std::sync::Arc;

/// An exchange + asset pair, e.g. `(COINBASE, BTC, USD)`.
///
/// Structural equality, hashing, and ordering over all three fields.
/// Exchange ids and asset codes are opaque non-empty strings; construction
/// validates non-emptiness so malformed instruments are a programmer error
/// caught at the boundary rather than silently accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentSpec {
    exchange_id: Arc<str>,
    base_asset: Arc<str>,
    counter_asset: Arc<str>,
}

impl InstrumentSpec {
    pub fn new(
        exchange_id: impl AsRef<str>,
        base_asset: impl AsRef<str>,
        counter_asset: impl AsRef<str>,
    ) -> Result<Self, BusError> {
        let exchange_id = non_empty(exchange_id.as_ref())?;
        let base_asset = non_empty(base_asset.as_ref())?;
        let counter_asset = non_empty(counter_asset.as_ref())?;
        Ok(Self { exchange_id, base_asset, counter_asset })
    }

    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    pub fn base_asset(&self) -> &str {
        &self.base_asset
    }

    pub fn counter_asset(&self) -> &str {
        &self.counter_asset
    }
}

fn non_empty(s: &str) -> Result<Arc<str>, BusError> {
    if s.is_empty() {
        Err(BusError::EmptyField)
    } else {
        Ok(Arc::from(s))
    }
}

impl fmt::Display for InstrumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}*{}", self.base_asset, self.counter_asset, self.exchange_id)
    }
}

/// Closed enumeration of data kinds. Extensible by adding variants; no
/// open-world polymorphism is supported by the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataKind {
    Ticker,
    OrderBook,
    OpenOrders,
    Trades,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataKind::Ticker => "ticker",
            DataKind::OrderBook => "order_book",
            DataKind::OpenOrders => "open_orders",
            DataKind::Trades => "trades",
        };
        f.write_str(s)
    }
}

/// `(InstrumentSpec, DataKind)` — the unit at which upstream feeds are
/// opened and refcounted. Immutable, hashable, ordering-irrelevant to
/// correctness but `Ord` so callers get a deterministic iteration order out
/// of `all_keys()` (handy for logging and for tests asserting exact upstream
/// notification payloads).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub instrument: InstrumentSpec,
    pub kind: DataKind,
}

impl SubscriptionKey {
    pub fn new(instrument: InstrumentSpec, kind: DataKind) -> Self {
        Self { instrument, kind }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instrument, self.kind)
    }
}

/// Opaque, non-empty subscriber identity chosen by the caller. Cheap to
/// clone and to use as a map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Arc<str>);

impl SubscriberId {
    pub fn new(id: impl AsRef<str>) -> Result<Self, BusError> {
        Ok(Self(non_empty(id.as_ref())?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> TryFrom<&'a str> for SubscriberId {
    type Error = BusError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
