//! Event — polymorphic over `DataKind`. The payload shape is owned entirely
//! by the caller's `SubscriptionManager` implementation (`P` below); the bus
//! only ever clones and forwards it, never inspects it.

use crate::key::InstrumentSpec;

#[derive(Clone, Debug)]
pub enum Event<P> {
    Ticker(InstrumentSpec, P),
    OrderBook(InstrumentSpec, P),
    OpenOrders(InstrumentSpec, P),
    Trade(InstrumentSpec, P),
}

impl<P> Event<P> {
    pub fn instrument(&self) -> &InstrumentSpec {
        match self {
            Event::Ticker(i, _)
            | Event::OrderBook(i, _)
            | Event::OpenOrders(i, _)
            | Event::Trade(i, _) => i,
        }
    }

    pub fn kind(&self) -> crate::key::DataKind {
        use crate::key::DataKind;
        match self {
            Event::Ticker(..) => DataKind::Ticker,
            Event::OrderBook(..) => DataKind::OrderBook,
            Event::OpenOrders(..) => DataKind::OpenOrders,
            Event::Trade(..) => DataKind::Trades,
        }
    }
}
