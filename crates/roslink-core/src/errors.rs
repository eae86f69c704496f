//! Protocol error taxonomy.
//!
//! One enum covers every failure the client can surface. Frame-scoped
//! variants (bad decode, unknown op, unmatched response) are logged and
//! dropped by the session loop without tearing the connection down;
//! registration and send errors are returned straight to the caller.

// ── Error code constants ────────────────────────────────────────────

/// Malformed JSON frame or a frame without an `op` field.
pub const DECODING_ERROR: &str = "DECODING_ERROR";
/// Message could not be serialized to the wire format.
pub const ENCODING_ERROR: &str = "ENCODING_ERROR";
/// Binary frame received; the protocol is text-only.
pub const UNSUPPORTED_FRAME_KIND: &str = "UNSUPPORTED_FRAME_KIND";
/// No handler registered for the message's operation code.
pub const UNHANDLED_OPERATION: &str = "UNHANDLED_OPERATION";
/// A field the operation requires is absent.
pub const MISSING_FIELD: &str = "MISSING_FIELD";
/// Service response with no matching in-flight request.
pub const UNMATCHED_RESPONSE: &str = "UNMATCHED_RESPONSE";
/// Second handler registered for an occupied operation code.
pub const DUPLICATE_HANDLER: &str = "DUPLICATE_HANDLER";
/// Service request reusing an id that is still pending.
pub const DUPLICATE_REQUEST_ID: &str = "DUPLICATE_REQUEST_ID";
/// Send attempted with no open session.
pub const TRANSPORT_UNAVAILABLE: &str = "TRANSPORT_UNAVAILABLE";
/// The session ended while work was outstanding.
pub const CONNECTION_LOST: &str = "CONNECTION_LOST";
/// Connect, handshake, or socket-level failure.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";

/// Errors surfaced by the protocol client.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Frame was not a well-formed protocol message.
    #[error("malformed frame: {detail}")]
    Decoding {
        /// What was wrong with the frame.
        detail: String,
    },

    /// Message could not be represented as the wire format.
    #[error("message not serializable: {detail}")]
    Encoding {
        /// Serializer failure description.
        detail: String,
    },

    /// Binary frame received. The protocol carries UTF-8 JSON only, so
    /// binary frames are rejected before any decode attempt.
    #[error("binary frames are not supported")]
    UnsupportedFrameKind,

    /// No built-in or registered handler for the operation code. Usually
    /// indicates a protocol or version mismatch with the peer.
    #[error("no handler registered for operation '{op}'")]
    UnhandledOperation {
        /// The unrecognized operation code.
        op: String,
    },

    /// A field the operation requires is absent.
    #[error("'{op}' message missing required field '{field}'")]
    MissingField {
        /// Operation code of the offending message.
        op: String,
        /// Name of the absent field.
        field: String,
    },

    /// Service response for an id with no in-flight request. Stale or
    /// duplicate responses land here; they are logged and dropped.
    #[error("service response for unknown request id '{id}'")]
    UnmatchedResponse {
        /// The unmatched request id.
        id: String,
    },

    /// Second handler registered for an operation that already has one.
    #[error("operation '{op}' already has a handler")]
    DuplicateHandler {
        /// The occupied operation code.
        op: String,
    },

    /// Service request sent with an id that is still pending. The previous
    /// waiter keeps its continuations; the new request is rejected.
    #[error("request id '{id}' is already pending")]
    DuplicateRequestId {
        /// The reused request id.
        id: String,
    },

    /// Send attempted with no open session (or a full outbound queue).
    #[error("no open session")]
    TransportUnavailable,

    /// The session ended. Also the indication fed to the failure
    /// continuation of every request pending at disconnect.
    #[error("connection lost")]
    ConnectionLost,

    /// Connect, handshake, or socket-level failure.
    #[error("transport failure: {detail}")]
    Transport {
        /// Underlying failure description.
        detail: String,
    },
}

impl BridgeError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decoding { .. } => DECODING_ERROR,
            Self::Encoding { .. } => ENCODING_ERROR,
            Self::UnsupportedFrameKind => UNSUPPORTED_FRAME_KIND,
            Self::UnhandledOperation { .. } => UNHANDLED_OPERATION,
            Self::MissingField { .. } => MISSING_FIELD,
            Self::UnmatchedResponse { .. } => UNMATCHED_RESPONSE,
            Self::DuplicateHandler { .. } => DUPLICATE_HANDLER,
            Self::DuplicateRequestId { .. } => DUPLICATE_REQUEST_ID,
            Self::TransportUnavailable => TRANSPORT_UNAVAILABLE,
            Self::ConnectionLost => CONNECTION_LOST,
            Self::Transport { .. } => TRANSPORT_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoding_code_and_message() {
        let err = BridgeError::Decoding { detail: "not json".into() };
        assert_eq!(err.code(), DECODING_ERROR);
        assert_eq!(err.to_string(), "malformed frame: not json");
    }

    #[test]
    fn missing_field_names_op_and_field() {
        let err = BridgeError::MissingField {
            op: "call_service".into(),
            field: "service".into(),
        };
        assert_eq!(err.code(), MISSING_FIELD);
        assert_eq!(
            err.to_string(),
            "'call_service' message missing required field 'service'"
        );
    }

    #[test]
    fn unmatched_response_carries_id() {
        let err = BridgeError::UnmatchedResponse { id: "call:7".into() };
        assert_eq!(err.code(), UNMATCHED_RESPONSE);
        assert!(err.to_string().contains("call:7"));
    }

    #[test]
    fn unit_variants_have_codes() {
        assert_eq!(BridgeError::UnsupportedFrameKind.code(), UNSUPPORTED_FRAME_KIND);
        assert_eq!(BridgeError::TransportUnavailable.code(), TRANSPORT_UNAVAILABLE);
        assert_eq!(BridgeError::ConnectionLost.code(), CONNECTION_LOST);
    }

    #[test]
    fn duplicate_variants_name_the_key() {
        let handler = BridgeError::DuplicateHandler { op: "status".into() };
        assert_eq!(handler.to_string(), "operation 'status' already has a handler");
        let id = BridgeError::DuplicateRequestId { id: "1".into() };
        assert_eq!(id.code(), DUPLICATE_REQUEST_ID);
    }
}
