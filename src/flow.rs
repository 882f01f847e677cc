//! Advisory flow control over the internal request queue.
//!
//! The controller watches queue depth against a configured expected
//! capacity. When an enqueue finds the queue at or above 10% of that
//! capacity, the sender of the triggering datagram is asked to pause; once
//! a dequeue drains the queue below 50%, a single `Continue` is broadcast
//! to registered listeners. Both signals are advisory: nothing is dropped
//! or refused, producers that ignore them only grow the queue.

use parking_lot::Mutex;

/// Flow state of one receiver, mutated only by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Flowing,
    Paused,
}

/// Signal emitted by the controller. `Pause` goes to the triggering
/// sender; `Continue` is broadcast system-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Pause,
    Continue,
}

/// Watermark-based controller shared by the receiver and the executor.
#[derive(Debug)]
pub struct FlowController {
    /// Depth at which an enqueue triggers a pause (10% of capacity,
    /// rounded up).
    pause_at: usize,
    /// Depth below which a dequeue while paused triggers a continue
    /// (50% of capacity).
    resume_below: usize,
    state: Mutex<FlowState>,
}

impl FlowController {
    /// `expected_capacity` is a fixed configuration constant, never
    /// measured from the queue.
    pub fn new(expected_capacity: usize) -> Self {
        Self {
            pause_at: ((expected_capacity + 9) / 10).max(1),
            resume_below: expected_capacity / 2,
            state: Mutex::new(FlowState::Flowing),
        }
    }

    pub fn state(&self) -> FlowState {
        *self.state.lock()
    }

    /// Evaluate an enqueue at the observed queue depth. At most one
    /// `Pause` per datagram, addressed to the sender that triggered it.
    pub fn on_enqueue(&self, depth: usize) -> Option<Signal> {
        if depth >= self.pause_at {
            *self.state.lock() = FlowState::Paused;
            Some(Signal::Pause)
        } else {
            None
        }
    }

    /// Evaluate a dequeue at the observed queue depth. Emits `Continue`
    /// once per pause episode.
    pub fn on_dequeue(&self, depth: usize) -> Option<Signal> {
        let mut state = self.state.lock();
        if *state == FlowState::Paused && depth < self.resume_below {
            *state = FlowState::Flowing;
            Some(Signal::Continue)
        } else {
            None
        }
    }
}
