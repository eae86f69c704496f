//! Transport abstraction and the WebSocket implementation.
//!
//! A [`Transport`] turns a URL into one live [`TransportSession`]: a pair of
//! channels carrying outbound frames toward the peer and inbound
//! [`TransportEvent`]s back. The session owns no protocol knowledge; it
//! moves frames and reports exactly one `Closed` event when the link dies,
//! which is what the connection supervisor keys its reconnect cycle on.
//!
//! [`WebSocketTransport`] is the production implementation on top of
//! `tokio-tungstenite`. Tests substitute their own [`Transport`] to drive
//! the client without sockets.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use roslink_core::BridgeError;

// ─────────────────────────────────────────────────────────────────────────────
// Frames and events
// ─────────────────────────────────────────────────────────────────────────────

/// A data frame received from the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete text frame.
    Text(String),
    /// A complete binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Whether this is a binary frame.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// A command sent toward the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Send a text frame.
    Text(String),
    /// Start a graceful close handshake.
    Close,
}

/// Something the transport observed on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame arrived.
    Frame(Frame),
    /// The connection ended. Sent exactly once per session, whatever the
    /// cause: peer close, I/O error, or local close.
    Closed {
        /// Close code from the peer, when one was received.
        code: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },
}

/// One live connection: a sender for outbound frames and a receiver for
/// everything the transport observes.
#[derive(Debug)]
pub struct TransportSession {
    /// Frames toward the peer. Dropping this sender closes the session.
    pub outbound: mpsc::Sender<OutboundFrame>,
    /// Events from the peer, ending with a single `Closed`.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Connection factory. One `open` call yields one session; the caller owns
/// retry policy and session replacement.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection to `url`.
    async fn open(&self, url: &str) -> Result<TransportSession, BridgeError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket implementation
// ─────────────────────────────────────────────────────────────────────────────

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `tokio-tungstenite` backed [`Transport`].
pub struct WebSocketTransport {
    outbound_buffer: usize,
    event_buffer: usize,
}

impl WebSocketTransport {
    /// Create a transport with the given channel capacities.
    #[must_use]
    pub fn new(outbound_buffer: usize, event_buffer: usize) -> Self {
        Self {
            outbound_buffer,
            event_buffer,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportSession, BridgeError> {
        let (ws, _response) = connect_async(url).await.map_err(|err| {
            BridgeError::Transport {
                detail: err.to_string(),
            }
        })?;
        tracing::debug!(url, "websocket established");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_buffer);
        let (event_tx, event_rx) = mpsc::channel(self.event_buffer);
        let _ = tokio::spawn(run_io(ws, outbound_rx, event_tx));

        Ok(TransportSession {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

/// Pump one WebSocket until it dies, then emit the final `Closed` event.
async fn run_io(
    ws: WsStream,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    events: mpsc::Sender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut closed: Option<TransportEvent> = None;

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(OutboundFrame::Text(text)) => {
                    if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
                        closed = Some(io_closed(&err.to_string()));
                        break;
                    }
                }
                Some(OutboundFrame::Close) => {
                    // Keep reading so the peer's close reply drains cleanly.
                    let _ = ws_tx.send(Message::Close(None)).await;
                }
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = TransportEvent::Frame(Frame::Text(text.to_string()));
                    if events.send(frame).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let frame = TransportEvent::Frame(Frame::Binary(data.to_vec()));
                    if events.send(frame).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws_tx.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    closed = Some(close_event(frame));
                    break;
                }
                Some(Err(err)) => {
                    closed = Some(io_closed(&err.to_string()));
                    break;
                }
                None => {
                    closed = Some(io_closed("connection reset"));
                    break;
                }
            },
        }
    }

    let event = closed.unwrap_or_else(|| io_closed("closed locally"));
    let _ = events.send(event).await;
}

fn close_event(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => TransportEvent::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => TransportEvent::Closed {
            code: None,
            reason: String::new(),
        },
    }
}

fn io_closed(reason: &str) -> TransportEvent {
    TransportEvent::Closed {
        code: None,
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
