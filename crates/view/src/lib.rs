//! Parallax image view: a flat image displaced by a depth map as the pointer moves.
//!
//! # Lifecycle
//! `Unmounted → Loading → (Ready | Failed) → Unmounted`. Only `Ready` owns a
//! rendering surface and a pointer subscription.
//!
//! # Invariants
//! - Setup either completes fully (surface, both layers, filter, listener) or
//!   leaves nothing behind.
//! - A texture fetch that completes after its mount was torn down or replaced
//!   never touches the rendering backend.
//! - Teardown is idempotent and always runs before the next mount.

pub mod config;
pub mod displacement;
mod view;

pub use config::{ConfigError, ViewConfig};
pub use displacement::{displacement_for, surface_local, viewport_normalized};
pub use view::{
    FetchCompletion, FetchTicket, Host, LoadOutcome, ParallaxImageView, ViewError, ViewPhase,
};

pub fn crate_info() -> &'static str {
    "parallax-view v0.1.0"
}
