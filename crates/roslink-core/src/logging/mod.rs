//! Logging bootstrap and test support.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host application's call. This module provides:
//! - [`init_subscriber`] for the standard setup: compact output on stderr,
//!   filterable through `RUST_LOG`
//! - [`capture_logs`] for tests that assert on emitted events

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (for example
/// `"info"` or `"roslink_client=debug"`) seeds the filter. Safe to call
/// more than once, later calls are no-ops.
pub fn init_subscriber(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
