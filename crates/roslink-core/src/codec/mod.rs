//! Payload codecs for compressed bridge traffic.

pub mod png;
