/*!
 * Foreground Debouncer
 * Collapses bursts of foreground-change events into one committed change
 *
 * The listener thread calls `request_foreground_change`; the scheduler thread
 * calls `fire_due` each tick. Both go through one mutex.
 */

use crate::core::limits::{FOREGROUND_DEBOUNCE, FOREGROUND_HYSTERESIS, FOREGROUND_RECENT_WINDOW};
use crate::core::types::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Observable debouncer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { pid: Pid, deadline: Instant },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebouncerStats {
    pub requests: u64,
    /// Pending requests overwritten by a newer one
    pub superseded: u64,
    /// Pending requests dropped because the target returned to the committed pid
    pub cancelled: u64,
    pub commits: u64,
}

#[derive(Debug, Default)]
struct Inner {
    pending: Option<(Pid, Instant)>,
    committed: Option<Pid>,
    /// Previously committed pid and when it lost the foreground
    previous: Option<(Pid, Instant)>,
    stats: DebouncerStats,
}

/// Debounce + hysteresis state machine
#[derive(Debug)]
pub struct ForegroundDebouncer {
    debounce: Duration,
    hysteresis: Duration,
    recent_window: Duration,
    inner: Mutex<Inner>,
}

impl ForegroundDebouncer {
    pub fn new() -> Self {
        Self::with_delays(FOREGROUND_DEBOUNCE, FOREGROUND_HYSTERESIS, FOREGROUND_RECENT_WINDOW)
    }

    pub fn with_delays(debounce: Duration, hysteresis: Duration, recent_window: Duration) -> Self {
        Self {
            debounce,
            hysteresis,
            recent_window,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record a raw foreground event; last write wins
    pub fn request_foreground_change(&self, pid: Pid, now: Instant) {
        let mut inner = self.inner.lock();
        inner.stats.requests += 1;

        if inner.committed == Some(pid) {
            if inner.pending.take().is_some() {
                inner.stats.cancelled += 1;
                trace!(pid, "Foreground returned to committed pid, pending change dropped");
            }
            return;
        }

        let returning = matches!(
            inner.previous,
            Some((prev, left_at)) if prev == pid
                && now.saturating_duration_since(left_at) < self.recent_window
        );
        let delay = if returning {
            self.debounce + self.hysteresis
        } else {
            self.debounce
        };

        if inner.pending.is_some() {
            inner.stats.superseded += 1;
        }
        inner.pending = Some((pid, now + delay));
        trace!(pid, delay_ms = delay.as_millis() as u64, returning, "Foreground change pending");
    }

    /// Commit the pending change if its deadline has passed
    pub fn fire_due(&self, now: Instant) -> Option<Pid> {
        let mut inner = self.inner.lock();
        let (pid, deadline) = inner.pending?;
        if now < deadline {
            return None;
        }
        inner.pending = None;
        if let Some(old) = inner.committed {
            inner.previous = Some((old, now));
        }
        inner.committed = Some(pid);
        inner.stats.commits += 1;
        debug!(pid, "Foreground change committed");
        Some(pid)
    }

    /// `fire_due` that hands the committed pid to `callback`
    ///
    /// The callback runs after the lock is released.
    pub fn fire_due_with<F: FnOnce(Pid)>(&self, now: Instant, callback: F) -> bool {
        match self.fire_due(now) {
            Some(pid) => {
                callback(pid);
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().pending.map(|(_, deadline)| deadline)
    }

    pub fn committed(&self) -> Option<Pid> {
        self.inner.lock().committed
    }

    pub fn state(&self) -> DebounceState {
        match self.inner.lock().pending {
            Some((pid, deadline)) => DebounceState::Pending { pid, deadline },
            None => DebounceState::Idle,
        }
    }

    pub fn stats(&self) -> DebouncerStats {
        self.inner.lock().stats
    }
}

impl Default for ForegroundDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
