//! Client configuration.

use serde::{Deserialize, Serialize};

use roslink_core::ReconnectConfig;

/// Default outbound frame buffer capacity.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;
/// Default inbound event buffer capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Everything a [`Client`](crate::Client) needs to run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Bridge endpoint, for example `ws://localhost:9090`.
    pub url: String,
    /// Reconnect policy applied after every lost connection.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// When set, a service call with no response within this window fails
    /// with a timeout payload. Unset means calls wait indefinitely.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    /// Capacity of the outbound frame channel (default: 64).
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Capacity of the inbound event channel (default: 64).
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_outbound_buffer() -> usize {
    DEFAULT_OUTBOUND_BUFFER
}
fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl ClientConfig {
    /// Config for `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            call_timeout_ms: None,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}
