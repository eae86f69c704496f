//! Open-state gate for deferred callbacks.
//!
//! Work that needs a live connection (advertising, subscribing, the first
//! service call) registers through [`ReadySignal::on_ready`]. While the
//! connection is down the callbacks queue up; each transition to open
//! flushes the queue in registration order. Once open, new callbacks run
//! immediately on the caller's thread.

use parking_lot::Mutex;

type ReadyFn = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ReadyState {
    open: bool,
    queued: Vec<ReadyFn>,
}

/// Tracks connection openness and parks callbacks until it flips.
#[derive(Default)]
pub struct ReadySignal {
    state: Mutex<ReadyState>,
}

impl ReadySignal {
    /// Create a closed signal with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once the connection is open.
    ///
    /// Runs immediately when already open, otherwise queues for the next
    /// transition to open. Callbacks are never invoked under the internal
    /// lock, so they may call back into the signal.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.open {
            drop(state);
            callback();
        } else {
            state.queued.push(Box::new(callback));
        }
    }

    /// Flip to open and flush the queue. Returns how many callbacks ran.
    pub fn mark_open(&self) -> usize {
        let queued = {
            let mut state = self.state.lock();
            state.open = true;
            std::mem::take(&mut state.queued)
        };
        let count = queued.len();
        for callback in queued {
            callback();
        }
        count
    }

    /// Flip back to closed. Callbacks registered from here on queue again.
    pub fn mark_closed(&self) {
        self.state.lock().open = false;
    }

    /// Whether the connection is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
