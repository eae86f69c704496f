//! Client handle and connection supervisor.
//!
//! [`Client`] is a cheap clone-and-share handle over one bridge connection:
//!
//! - registration surfaces: topic listeners, op handlers, ready callbacks
//! - traffic: [`Client::send`] and [`Client::send_service_request`]
//! - lifecycle: [`Client::connect`], [`Client::close`], a watchable
//!   [`ConnectionState`]
//!
//! One supervisor task owns the connect/reconnect cycle. It opens sessions
//! through the configured [`Transport`], pumps inbound frames into the
//! protocol engine, and applies the reconnect policy when a session dies.
//! Registrations and in-flight bookkeeping live outside the session, so
//! they survive every reconnect; only in-flight service calls are failed
//! when the link drops, since their responses can no longer arrive.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use roslink_core::{BridgeError, BridgeMessage};

use crate::config::ClientConfig;
use crate::engine::ProtocolEngine;
use crate::fanout::{EventFanout, ListenerId};
use crate::pending::{FailureFn, PendingCalls, SuccessFn};
use crate::ready::ReadySignal;
use crate::transport::{
    OutboundFrame, Transport, TransportEvent, TransportSession, WebSocketTransport,
};

/// Lifecycle channel, emitted with a null payload every time the
/// connection opens. Unlike [`Client::on_ready`], listeners here fire on
/// every open, including reconnects.
pub const READY_CHANNEL: &str = "ready";

/// Where the connection currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, and no attempt in progress.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected; traffic flows.
    Open,
    /// A locally requested close is in progress.
    Closing,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one bridge connection. Clones share all state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    engine: ProtocolEngine,
    pending: Arc<PendingCalls>,
    events: Arc<EventFanout>,
    ready: ReadySignal,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    frame_errors: AtomicU64,
}

impl Client {
    /// Client over the production WebSocket transport.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(WebSocketTransport::new(
            config.outbound_buffer,
            config.event_buffer,
        ));
        Self::with_transport(config, transport)
    }

    /// Client over a caller-supplied transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let events = Arc::new(EventFanout::new());
        let engine = ProtocolEngine::new(Arc::clone(&pending), Arc::clone(&events));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                engine,
                pending,
                events,
                ready: ReadySignal::new(),
                state_tx,
                shutdown_tx,
                supervisor: Mutex::new(None),
                frame_errors: AtomicU64::new(0),
            }),
        }
    }

    // ── Lifecycle ──

    /// Start the connection supervisor. Must be called on a Tokio runtime.
    ///
    /// Idempotent while a supervisor runs. After [`Client::close`], or
    /// after the reconnect policy gave up, calling this again starts a
    /// fresh connect cycle.
    pub fn connect(&self) {
        let mut supervisor = self.inner.supervisor.lock();
        let _ = self.inner.shutdown_tx.send_replace(false);
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            // A live supervisor observes the cleared shutdown flag and
            // keeps going; nothing to spawn.
            return;
        }
        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.inner))));
    }

    /// Close the connection and stop reconnecting. Idempotent.
    ///
    /// In-flight service calls fail with a connection-lost payload once the
    /// session is torn down.
    pub fn close(&self) {
        if *self.inner.shutdown_tx.borrow() {
            return;
        }
        if *self.inner.state_tx.borrow() == ConnectionState::Open {
            let _ = self.inner.state_tx.send_replace(ConnectionState::Closing);
        }
        let _ = self.inner.shutdown_tx.send_replace(true);
    }

    // ── Traffic ──

    /// Encode and transmit a message on the live connection.
    pub fn send(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        self.inner.engine.send(message)
    }

    /// Transmit a service request and park its continuations under the
    /// request id until the response, a disconnect, or the configured call
    /// timeout settles them.
    ///
    /// Continuations are never invoked from this method. When a call
    /// timeout is configured this must run on a Tokio runtime.
    pub fn send_service_request(
        &self,
        message: &BridgeMessage,
        on_success: Option<SuccessFn>,
        on_failure: Option<FailureFn>,
    ) -> Result<(), BridgeError> {
        self.inner
            .engine
            .send_service_request(message, on_success, on_failure)?;
        if let Some(timeout_ms) = self.inner.config.call_timeout_ms {
            if let Some(id) = message.id() {
                self.spawn_call_timeout(id.to_string(), timeout_ms);
            }
        }
        Ok(())
    }

    fn spawn_call_timeout(&self, id: String, timeout_ms: u64) {
        let inner = Arc::clone(&self.inner);
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if let Some(call) = inner.pending.take(&id) {
                warn!(id = %id, timeout_ms, "service call timed out");
                call.fail(Value::String(format!(
                    "service call timed out after {timeout_ms} ms"
                )));
            }
        });
    }

    // ── Registration ──

    /// Register a handler for a non-built-in operation.
    pub fn register_handler(
        &self,
        op: &str,
        handler: impl Fn(BridgeMessage) + Send + Sync + 'static,
    ) -> Result<(), BridgeError> {
        self.inner.engine.register_handler(op, handler)
    }

    /// Listen on a topic or lifecycle channel.
    pub fn on(
        &self,
        channel: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.on(channel, callback)
    }

    /// Listen for a single emit on a channel.
    pub fn once(
        &self,
        channel: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.once(channel, callback)
    }

    /// Remove one listener. Returns whether it was still registered.
    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        self.inner.events.off(channel, id)
    }

    /// Remove every listener on a channel.
    pub fn off_all(&self, channel: &str) {
        self.inner.events.off_all(channel);
    }

    /// Invoke the listeners on `channel` locally, without touching the
    /// wire.
    pub fn emit(&self, channel: &str, payload: &Value) {
        self.inner.events.emit(channel, payload);
    }

    /// Run `callback` once the connection is open: immediately when it
    /// already is, otherwise queued for the next open.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.ready.on_ready(callback);
    }

    // ── Introspection ──

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Whether the connection is open right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state transitions. The receiver starts at the
    /// current state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of in-flight service calls.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Count of inbound frames dropped as undecodable or unroutable.
    #[must_use]
    pub fn frame_errors(&self) -> u64 {
        self.inner.frame_errors.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

enum CycleEnd {
    /// `close` was requested.
    Shutdown,
    /// The reconnect policy ran out of attempts.
    GaveUp,
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn supervise(inner: Arc<ClientInner>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    loop {
        let end = run_connect_cycle(&inner, &mut shutdown_rx).await;
        let _ = inner.state_tx.send_replace(ConnectionState::Disconnected);

        // Exit under the spawn guard so a concurrent connect() either
        // revives this task or finds the slot empty and spawns anew.
        let mut supervisor = inner.supervisor.lock();
        match end {
            CycleEnd::GaveUp => {
                *supervisor = None;
                return;
            }
            CycleEnd::Shutdown => {
                if *inner.shutdown_tx.borrow() {
                    *supervisor = None;
                    return;
                }
                // connect() cleared the flag while we were winding down;
                // run another cycle.
                drop(supervisor);
            }
        }
    }
}

async fn run_connect_cycle(
    inner: &ClientInner,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> CycleEnd {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown_rx.borrow_and_update() {
            return CycleEnd::Shutdown;
        }
        let _ = inner.state_tx.send_replace(ConnectionState::Connecting);
        debug!(url = %inner.config.url, attempt, "connecting");

        match inner.transport.open(&inner.config.url).await {
            Ok(mut session) => {
                if *shutdown_rx.borrow_and_update() {
                    let _ = session.outbound.try_send(OutboundFrame::Close);
                    return CycleEnd::Shutdown;
                }
                attempt = 0;
                inner.engine.attach_session(session.outbound.clone());
                let _ = inner.state_tx.send_replace(ConnectionState::Open);
                info!(url = %inner.config.url, "bridge connection open");
                let flushed = inner.ready.mark_open();
                if flushed > 0 {
                    debug!(flushed, "ran queued ready callbacks");
                }
                inner.events.emit(READY_CHANNEL, &Value::Null);

                let end = run_session(inner, &mut session, shutdown_rx).await;

                inner.engine.detach_session();
                inner.ready.mark_closed();
                fail_pending(inner, "connection lost");
                let _ = inner.state_tx.send_replace(ConnectionState::Disconnected);
                match end {
                    SessionEnd::Shutdown => return CycleEnd::Shutdown,
                    SessionEnd::Lost(reason) => {
                        warn!(reason = %reason, "bridge connection lost");
                    }
                }
            }
            Err(err) => {
                let _ = inner.state_tx.send_replace(ConnectionState::Disconnected);
                attempt += 1;
                warn!(error = %err, attempt, "connect failed");
            }
        }

        if *shutdown_rx.borrow_and_update() {
            return CycleEnd::Shutdown;
        }
        if inner.config.reconnect.exhausted(attempt) {
            warn!(attempt, "reconnect attempts exhausted");
            return CycleEnd::GaveUp;
        }
        let delay = inner
            .config
            .reconnect
            .delay_ms(attempt.saturating_sub(1), rand::random::<f64>());
        debug!(delay_ms = delay, "reconnect scheduled");
        if wait_or_shutdown(shutdown_rx, delay).await {
            return CycleEnd::Shutdown;
        }
    }
}

/// Pump one session until it ends. Frame-level errors are logged and
/// counted; only transport loss or shutdown ends the session.
async fn run_session(
    inner: &ClientInner,
    session: &mut TransportSession,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow_and_update() {
                    let _ = session.outbound.try_send(OutboundFrame::Close);
                    return SessionEnd::Shutdown;
                }
            }
            event = session.events.recv() => match event {
                Some(TransportEvent::Frame(frame)) => {
                    if let Err(err) = inner.engine.handle_frame(frame) {
                        let _ = inner.frame_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(code = err.code(), error = %err, "frame dropped");
                    }
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    let reason = if reason.is_empty() {
                        format!("closed by peer (code {code:?})")
                    } else {
                        reason
                    };
                    return SessionEnd::Lost(reason);
                }
                None => return SessionEnd::Lost("event channel closed".to_string()),
            },
        }
    }
}

fn fail_pending(inner: &ClientInner, reason: &str) {
    let drained = inner.pending.drain();
    if drained.is_empty() {
        return;
    }
    warn!(count = drained.len(), reason, "failing in-flight service calls");
    for (_id, call) in drained {
        call.fail(Value::String(reason.to_string()));
    }
}

async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay_ms: u64) -> bool {
    let sleep = tokio::time::sleep(Duration::from_millis(delay_ms));
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
