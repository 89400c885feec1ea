//! Error taxonomy (spec.md §7). `SubscriberInconsistency` and `ConsumerError`
//! are logged and absorbed, not represented here; `BusError` covers the
//! "programmer error" category (surfaced immediately, no mutation), while
//! `UpstreamNotifyFailure` is surfaced as a plain `anyhow::Error` wrapping
//! whatever the caller's `SubscriptionManager` returned.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("subscriber id and instrument/asset fields must be non-empty strings")]
    EmptyField,
}
