//! Protocol engine: outbound sends and inbound op dispatch.
//!
//! The engine sits between the transport session and the client-facing
//! registries. Inbound text frames are decoded and routed on their `op`
//! field:
//!
//! - `publish` fans the `msg` payload out to topic listeners
//! - `call_service` fans the whole message out to the serving listener
//! - `service_response` settles the matching in-flight call
//! - anything else goes to a registered custom handler
//!
//! Outbound, the engine encodes messages onto whatever session is attached.
//! Sessions come and go across reconnects while the registries, and
//! therefore all registrations and in-flight calls, stay put.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use roslink_core::message::{BUILTIN_OPS, op};
use roslink_core::{BridgeError, BridgeMessage, ServiceResponse};

use crate::fanout::EventFanout;
use crate::pending::{FailureFn, PendingCall, PendingCalls, SuccessFn};
use crate::transport::{Frame, OutboundFrame};

/// Handler for a non-built-in operation.
pub type OpHandler = Arc<dyn Fn(BridgeMessage) + Send + Sync>;

/// Message router shared by the client handle and the connection
/// supervisor.
pub struct ProtocolEngine {
    session: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    pending: Arc<PendingCalls>,
    handlers: Mutex<HashMap<String, OpHandler>>,
    events: Arc<EventFanout>,
}

impl ProtocolEngine {
    /// Create an engine over the shared registries.
    pub fn new(pending: Arc<PendingCalls>, events: Arc<EventFanout>) -> Self {
        Self {
            session: Mutex::new(None),
            pending,
            handlers: Mutex::new(HashMap::new()),
            events,
        }
    }

    // ── Session attachment ──

    /// Route outbound frames through `sender` from now on.
    pub fn attach_session(&self, sender: mpsc::Sender<OutboundFrame>) {
        *self.session.lock() = Some(sender);
    }

    /// Drop the current session. Subsequent sends fail with
    /// [`BridgeError::TransportUnavailable`].
    pub fn detach_session(&self) {
        *self.session.lock() = None;
    }

    /// Whether a session is currently attached.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    // ── Outbound ──

    /// Encode and transmit a message on the attached session.
    pub fn send(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let text = message.encode()?;
        self.send_text(text)
    }

    /// Transmit a service request, parking its continuations under the
    /// request id before the frame leaves.
    ///
    /// On any transmission failure the entry is removed again and the error
    /// is returned to the caller; the continuations are never invoked from
    /// this method.
    pub fn send_service_request(
        &self,
        message: &BridgeMessage,
        on_success: Option<SuccessFn>,
        on_failure: Option<FailureFn>,
    ) -> Result<(), BridgeError> {
        let id = message
            .id()
            .ok_or_else(|| missing(message.op(), "id"))?
            .to_string();
        let text = message.encode()?;
        self.pending
            .insert(&id, PendingCall::new(on_success, on_failure))?;
        if let Err(err) = self.send_text(text) {
            drop(self.pending.take(&id));
            return Err(err);
        }
        Ok(())
    }

    fn send_text(&self, text: String) -> Result<(), BridgeError> {
        let sender = self
            .session
            .lock()
            .clone()
            .ok_or(BridgeError::TransportUnavailable)?;
        sender
            .try_send(OutboundFrame::Text(text))
            .map_err(|err| match err {
                // A dead channel means the session ended under us and the
                // supervisor has not detached it yet.
                mpsc::error::TrySendError::Closed(_) => BridgeError::ConnectionLost,
                mpsc::error::TrySendError::Full(_) => BridgeError::TransportUnavailable,
            })
    }

    // ── Handler registry ──

    /// Register `handler` for a non-built-in `op`.
    ///
    /// The built-in operations and any op already claimed are rejected with
    /// [`BridgeError::DuplicateHandler`].
    pub fn register_handler(
        &self,
        op: &str,
        handler: impl Fn(BridgeMessage) + Send + Sync + 'static,
    ) -> Result<(), BridgeError> {
        if BUILTIN_OPS.contains(&op) {
            return Err(BridgeError::DuplicateHandler { op: op.to_string() });
        }
        match self.handlers.lock().entry(op.to_string()) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateHandler { op: op.to_string() }),
            Entry::Vacant(slot) => {
                let _ = slot.insert(Arc::new(handler));
                Ok(())
            }
        }
    }

    // ── Inbound ──

    /// Decode one transport frame and dispatch it.
    ///
    /// Errors describe this frame only; the connection stays usable.
    pub fn handle_frame(&self, frame: Frame) -> Result<(), BridgeError> {
        match frame {
            Frame::Binary(_) => Err(BridgeError::UnsupportedFrameKind),
            Frame::Text(text) => {
                let message = BridgeMessage::decode(&text)?;
                self.route(message)
            }
        }
    }

    fn route(&self, message: BridgeMessage) -> Result<(), BridgeError> {
        let op = message.op().to_string();
        match op.as_str() {
            op::PUBLISH => self.handle_publish(&message),
            op::CALL_SERVICE => self.handle_call_service(&message),
            op::SERVICE_RESPONSE => self.handle_service_response(&message),
            _ => {
                let handler = self.handlers.lock().get(&op).cloned();
                match handler {
                    Some(handler) => {
                        handler(message);
                        Ok(())
                    }
                    None => Err(BridgeError::UnhandledOperation { op }),
                }
            }
        }
    }

    fn handle_publish(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let topic = message
            .topic()
            .ok_or_else(|| missing(op::PUBLISH, "topic"))?;
        let payload = message.get("msg").cloned().unwrap_or(Value::Null);
        self.events.emit(topic, &payload);
        Ok(())
    }

    fn handle_call_service(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let service = message
            .service()
            .ok_or_else(|| missing(op::CALL_SERVICE, "service"))?;
        // The serving listener needs the id and args, so it gets the whole
        // message rather than a payload field.
        self.events.emit(service, &message.to_value());
        Ok(())
    }

    fn handle_service_response(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let id = message
            .id()
            .ok_or_else(|| missing(op::SERVICE_RESPONSE, "id"))?;
        let call = self
            .pending
            .take(id)
            .ok_or_else(|| BridgeError::UnmatchedResponse { id: id.to_string() })?;
        let values = message.get("values").cloned().unwrap_or(Value::Null);
        if matches!(message.get("result"), Some(Value::Bool(false))) {
            call.fail(values);
        } else {
            call.succeed(ServiceResponse::new(values));
        }
        Ok(())
    }
}

fn missing(op: &str, field: &str) -> BridgeError {
    BridgeError::MissingField {
        op: op.to_string(),
        field: field.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
