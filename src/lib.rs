//! Subscription registry and event bus for multiplexing many logical
//! marketdata subscribers onto a minimal set of upstream feeds.
//!
//! Subscribers declare what they want (instrument + data kind); the bus
//! deduplicates demand across subscribers, tells the caller-supplied
//! [`SubscriptionManager`] to open exactly the union of what's currently
//! wanted, and fans each subscriber its own merged, lossy-under-backpressure
//! event stream. The actual exchange connections are out of scope here --
//! see [`SubscriptionManager`] for the seam.

pub mod bus;
pub mod error;
pub mod event;
pub mod key;
pub mod manager;
mod registry;
mod stream;

pub use bus::EventBus;
pub use error::BusError;
pub use event::Event;
pub use key::{DataKind, InstrumentSpec, SubscriberId, SubscriptionKey};
pub use manager::SubscriptionManager;
pub use registry::{DemandRegistry, HoldTransition, ReleaseTransition};
