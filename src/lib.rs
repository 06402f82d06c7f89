//! Playspace Sync Library
//!
//! Receives a physical safety boundary from a companion device over the LAN,
//! commits it to the headset tracking runtime and answers nearest-wall
//! queries for comfort features.
//!
//! # Features
//!
//! - `comfort` - Auto-turn, vestibular motion and view ratchetting (enabled by default)
//! - `metrics_extended` - Comfort tick-time percentiles (enabled by default)

pub mod chaperone;
pub mod config;
pub mod constants;
pub mod metrics;
pub mod net;
pub mod tracking;
pub mod util;

// Feature-gated modules (enabled by default)
#[cfg(feature = "comfort")]
pub mod comfort;
