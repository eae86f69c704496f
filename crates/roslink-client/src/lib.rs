//! ROS Bridge protocol client.
//!
//! Talks the rosbridge v2 JSON protocol over a persistent WebSocket:
//!
//! - [`Client`]: publish, call services, listen on topics, register
//!   handlers for additional operations
//! - automatic reconnect with capped exponential backoff and jitter
//! - listener, handler, and ready registrations survive reconnects;
//!   in-flight service calls fail fast when the link drops
//!
//! Wire types and the error taxonomy live in `roslink-core` and are
//! re-exported here for convenience.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod engine;
pub mod fanout;
pub mod pending;
pub mod ready;
pub mod transport;

pub use client::{Client, ConnectionState, READY_CHANNEL};
pub use config::ClientConfig;
pub use fanout::ListenerId;
pub use roslink_core::{BridgeError, BridgeMessage, ServiceResponse};
