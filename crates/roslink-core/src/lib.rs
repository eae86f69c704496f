//! # roslink-core
//!
//! Shared vocabulary for the roslink workspace: everything the protocol
//! client needs that is not tied to a live connection.
//!
//! - **Messages**: [`BridgeMessage`] (a JSON object with an `op`
//!   discriminator) and [`ServiceResponse`] (the detached result payload of
//!   a completed service call)
//! - **Errors**: the [`BridgeError`] taxonomy with machine-readable codes
//! - **Reconnect**: [`ReconnectConfig`] and the backoff math behind it
//! - **Codec**: [`codec::png`] for PNG-compressed payload envelopes
//! - **Logging**: [`logging::init_subscriber`] for the tracing bootstrap and
//!   [`logging::capture_logs`] for asserting on events in tests

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod logging;
pub mod message;
pub mod retry;

pub use errors::BridgeError;
pub use message::{BridgeMessage, ServiceResponse};
pub use retry::ReconnectConfig;
