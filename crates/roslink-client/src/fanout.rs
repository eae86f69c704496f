//! Listener registry with per-channel fan-out.
//!
//! Channels are plain string keys (topic names, plus a few lifecycle
//! channels the client defines). Each channel holds an ordered list of
//! listeners; [`EventFanout::emit`] invokes them in registration order.
//! One-shot listeners are removed before their callback runs, so a
//! listener that re-emits its own channel cannot fire itself twice.
//!
//! Callbacks are always invoked outside the registry lock. They may
//! register, remove, or emit freely; listeners added during an emit are
//! picked up by the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

/// Shared listener callback.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    once: bool,
    callback: Listener,
}

/// Ordered, channel-keyed listener registry.
#[derive(Default)]
pub struct EventFanout {
    channels: Mutex<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl EventFanout {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on `channel`. It fires on every emit until
    /// removed.
    pub fn on(
        &self,
        channel: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(channel, false, Arc::new(callback))
    }

    /// Register a one-shot listener on `channel`. It is removed before its
    /// first invocation.
    pub fn once(
        &self,
        channel: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.register(channel, true, Arc::new(callback))
    }

    fn register(&self, channel: &str, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_string())
            .or_default()
            .push(Entry { id, once, callback });
        id
    }

    /// Remove one listener. Returns whether it was still registered.
    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.lock();
        let Some(entries) = channels.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() < before;
        if entries.is_empty() {
            let _ = channels.remove(channel);
        }
        removed
    }

    /// Remove every listener on `channel`.
    pub fn off_all(&self, channel: &str) {
        let _ = self.channels.lock().remove(channel);
    }

    /// Number of listeners currently registered on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, |entries| entries.len())
    }

    /// Invoke every listener on `channel` with `payload`, in registration
    /// order. One-shot listeners are dropped from the registry first.
    pub fn emit(&self, channel: &str, payload: &Value) {
        let snapshot: Vec<Listener> = {
            let mut channels = self.channels.lock();
            let Some(entries) = channels.get_mut(channel) else {
                return;
            };
            let snapshot = entries
                .iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                let _ = channels.remove(channel);
            }
            snapshot
        };
        for callback in snapshot {
            callback(payload);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::{Value, json};

    use super::*;

    // -- Ordering and payload --

    #[test]
    fn emit_invokes_in_registration_order() {
        let fanout = EventFanout::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 1..=3 {
            let seen = Arc::clone(&seen);
            let _ = fanout.on("/odom", move |_| seen.lock().push(tag));
        }
        fanout.emit("/odom", &json!({"x": 1.0}));
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn emit_passes_payload_through() {
        let fanout = EventFanout::new();
        let seen = Arc::new(Mutex::new(Value::Null));
        let sink = Arc::clone(&seen);
        let _ = fanout.on("/chatter", move |payload| *sink.lock() = payload.clone());
        fanout.emit("/chatter", &json!({"data": "hi"}));
        assert_eq!(*seen.lock(), json!({"data": "hi"}));
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let fanout = EventFanout::new();
        fanout.emit("/nobody", &Value::Null);
    }

    // -- One-shot listeners --

    #[test]
    fn once_fires_exactly_once() {
        let fanout = EventFanout::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let _ = fanout.once("/tick", move |_| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });
        fanout.emit("/tick", &Value::Null);
        fanout.emit("/tick", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(fanout.listener_count("/tick"), 0);
    }

    #[test]
    fn once_is_removed_before_invocation() {
        // A one-shot listener that re-emits its own channel must not recurse.
        let fanout = Arc::new(EventFanout::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let reentrant = Arc::clone(&fanout);
        let _ = fanout.once("/tick", move |_| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            reentrant.emit("/tick", &Value::Null);
        });
        fanout.emit("/tick", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // -- Removal --

    #[test]
    fn off_removes_one_listener() {
        let fanout = EventFanout::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let keep = fanout.on("/chatter", move |_| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        });
        let gone = fanout.on("/chatter", |_| panic!("removed listener fired"));

        assert!(fanout.off("/chatter", gone));
        assert!(!fanout.off("/chatter", gone));
        fanout.emit("/chatter", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(fanout.off("/chatter", keep));
    }

    #[test]
    fn off_all_clears_channel() {
        let fanout = EventFanout::new();
        let _ = fanout.on("/a", |_| panic!("cleared listener fired"));
        let _ = fanout.on("/a", |_| panic!("cleared listener fired"));
        fanout.off_all("/a");
        assert_eq!(fanout.listener_count("/a"), 0);
        fanout.emit("/a", &Value::Null);
    }

    #[test]
    fn ids_are_unique_across_channels() {
        let fanout = EventFanout::new();
        let a = fanout.on("/a", |_| {});
        let b = fanout.on("/b", |_| {});
        assert_ne!(a, b);
        // An id only removes from the channel it belongs to.
        assert!(!fanout.off("/a", b));
    }

    // -- Reentrancy --

    #[test]
    fn listener_registered_during_emit_fires_next_time() {
        let fanout = Arc::new(EventFanout::new());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let registry = Arc::clone(&fanout);
        let _ = fanout.once("/boot", move |_| {
            let counter = Arc::clone(&counter);
            let _ = registry.on("/boot", move |_| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        fanout.emit("/boot", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        fanout.emit("/boot", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
