//! Timer abstraction for delayed and retry-delayed jobs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Callback fired when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks without blocking the caller.
pub trait Timer: Send + Sync + 'static {
    /// Run `callback` once `delay` has elapsed.
    fn after(&self, delay: Duration, callback: TimerCallback);
}

/// Timer backed by the tokio clock. Honors paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}

struct Scheduled {
    due: Duration,
    seq: u64,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    scheduled: Vec<Scheduled>,
}

/// Timer driven by explicit calls to [`ManualTimer::advance`].
///
/// Callbacks fire in deadline order, ties in registration order.
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<ManualState>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the timer was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of callbacks that have not fired yet.
    pub fn pending(&self) -> usize {
        self.lock().scheduled.len()
    }

    /// Delay from now until the earliest pending callback.
    pub fn next_due(&self) -> Option<Duration> {
        let state = self.lock();
        state
            .scheduled
            .iter()
            .map(|s| s.due.saturating_sub(state.now))
            .min()
    }

    /// Move virtual time forward and fire every callback that became due.
    /// Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut state = self.lock();
            state.now = state.now.saturating_add(by);
            let now = state.now;
            let (mut due, pending): (Vec<_>, Vec<_>) =
                state.scheduled.drain(..).partition(|s| s.due <= now);
            state.scheduled = pending;
            due.sort_by_key(|s| (s.due, s.seq));
            due
        };

        // Fired outside the lock so callbacks may schedule again.
        let fired = due.len();
        for scheduled in due {
            (scheduled.callback)();
        }
        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Timer for ManualTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now.saturating_add(delay);
        state.scheduled.push(Scheduled { due, seq, callback });
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualTimer")
            .field("now", &state.now)
            .field("pending", &state.scheduled.len())
            .finish()
    }
}
