//! In-flight service call registry.
//!
//! Every outbound service request parks its continuations here under the
//! request id before the frame is handed to the transport. Whoever settles
//! the call, the response router or the disconnect sweep, removes the entry
//! with [`PendingCalls::take`] first and invokes the continuation outside
//! the lock. An id can therefore settle at most once; the loser of the race
//! simply finds nothing to take.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;
use serde_json::Value;

use roslink_core::{BridgeError, ServiceResponse};

/// Continuation for a successful service call.
pub type SuccessFn = Box<dyn FnOnce(ServiceResponse) + Send>;
/// Continuation for a failed service call, receiving the error payload.
pub type FailureFn = Box<dyn FnOnce(Value) + Send>;

/// Continuations for one in-flight call. Either side may be absent; a call
/// with neither is legal and settles silently.
pub struct PendingCall {
    /// Invoked when the peer reports success.
    pub on_success: Option<SuccessFn>,
    /// Invoked when the peer reports failure or the connection drops.
    pub on_failure: Option<FailureFn>,
}

impl PendingCall {
    /// Bundle both continuations.
    #[must_use]
    pub fn new(on_success: Option<SuccessFn>, on_failure: Option<FailureFn>) -> Self {
        Self {
            on_success,
            on_failure,
        }
    }

    /// Settle successfully, consuming the call.
    pub fn succeed(self, response: ServiceResponse) {
        if let Some(callback) = self.on_success {
            callback(response);
        }
    }

    /// Settle with failure, consuming the call.
    pub fn fail(self, values: Value) {
        if let Some(callback) = self.on_failure {
            callback(values);
        }
    }
}

/// Id-keyed table of in-flight calls.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<HashMap<String, PendingCall>>,
}

impl PendingCalls {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a call under `id`.
    ///
    /// A duplicate id is rejected and the original entry stays untouched.
    pub fn insert(&self, id: &str, call: PendingCall) -> Result<(), BridgeError> {
        match self.inner.lock().entry(id.to_string()) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateRequestId { id: id.to_string() }),
            Entry::Vacant(slot) => {
                let _ = slot.insert(call);
                Ok(())
            }
        }
    }

    /// Remove and return the call parked under `id`, if any.
    pub fn take(&self, id: &str) -> Option<PendingCall> {
        self.inner.lock().remove(id)
    }

    /// Remove and return every in-flight call.
    pub fn drain(&self) -> Vec<(String, PendingCall)> {
        self.inner.lock().drain().collect()
    }

    /// Number of in-flight calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no call is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn flagged_call(flag: &Arc<AtomicBool>) -> PendingCall {
        let on_success = Arc::clone(flag);
        PendingCall::new(
            Some(Box::new(move |_| on_success.store(true, Ordering::SeqCst))),
            None,
        )
    }

    #[test]
    fn insert_then_take_round_trip() {
        let pending = PendingCalls::new();
        let flag = Arc::new(AtomicBool::new(false));
        pending.insert("call_1", flagged_call(&flag)).unwrap();
        assert_eq!(pending.len(), 1);

        let call = pending.take("call_1").unwrap();
        assert!(pending.is_empty());
        call.succeed(ServiceResponse::new(json!({"ok": true})));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn take_unknown_id_is_none() {
        let pending = PendingCalls::new();
        assert!(pending.take("ghost").is_none());
    }

    #[test]
    fn duplicate_id_rejected_and_original_kept() {
        let pending = PendingCalls::new();
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        pending.insert("call_1", flagged_call(&first)).unwrap();

        let err = pending.insert("call_1", flagged_call(&second)).unwrap_err();
        assert_matches!(err, BridgeError::DuplicateRequestId { id } if id == "call_1");

        pending
            .take("call_1")
            .unwrap()
            .succeed(ServiceResponse::new(json!(null)));
        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));
    }

    #[test]
    fn fail_invokes_failure_side_only() {
        let succeeded = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let on_success = Arc::clone(&succeeded);
        let on_failure = Arc::clone(&failed);
        let call = PendingCall::new(
            Some(Box::new(move |_| on_success.store(true, Ordering::SeqCst))),
            Some(Box::new(move |_| on_failure.store(true, Ordering::SeqCst))),
        );

        call.fail(json!("no provider"));
        assert!(!succeeded.load(Ordering::SeqCst));
        assert!(failed.load(Ordering::SeqCst));
    }

    #[test]
    fn absent_continuations_settle_silently() {
        PendingCall::new(None, None).succeed(ServiceResponse::new(json!(null)));
        PendingCall::new(None, None).fail(json!(null));
    }

    #[test]
    fn drain_returns_everything() {
        let pending = PendingCalls::new();
        pending.insert("a", PendingCall::new(None, None)).unwrap();
        pending.insert("b", PendingCall::new(None, None)).unwrap();

        let mut drained: Vec<String> = pending.drain().into_iter().map(|(id, _)| id).collect();
        drained.sort();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(pending.is_empty());
    }
}
