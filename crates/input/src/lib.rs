//! Pointer input: host-delivered pointer samples and the subscriptions that
//! receive them.
//!
//! # Invariants
//! - A subscription belongs to exactly one view instance; there is no global listener.
//! - Detaching is idempotent and an unknown subscription never receives events.

pub mod pointer;
pub mod router;

pub use pointer::PointerEvent;
pub use router::{PointerRouter, Subscription, SubscriptionId};

pub fn crate_info() -> &'static str {
    "parallax-input v0.1.0"
}
