/*!
 * Working-Set Trim Policy
 * Closed-loop per-process trim scheduling driven by memory actually freed
 */

use crate::core::limits::{
    TRIM_AGGRESSIVE_THRESHOLD_BYTES, TRIM_DEFAULT_INTERVAL, TRIM_EFFECTIVE_PERCENT,
    TRIM_GROWTH_THRESHOLD_PERCENT, TRIM_GROW_FACTOR, TRIM_HISTORY_LEN, TRIM_INEFFECTIVE_PERCENT,
    TRIM_MAX_INTERVAL, TRIM_MIN_BACKGROUND_TIME, TRIM_MIN_INTERVAL, TRIM_SHRINK_FACTOR,
    TRIM_SIGNIFICANT_PERCENT,
};
use crate::core::types::Pid;
use ahash::RandomState;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Tunables for the trim controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimPolicy {
    pub default_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub min_background_time: Duration,
    pub growth_threshold_percent: f64,
    pub aggressive_threshold_bytes: u64,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            default_interval: TRIM_DEFAULT_INTERVAL,
            min_interval: TRIM_MIN_INTERVAL,
            max_interval: TRIM_MAX_INTERVAL,
            min_background_time: TRIM_MIN_BACKGROUND_TIME,
            growth_threshold_percent: TRIM_GROWTH_THRESHOLD_PERCENT,
            aggressive_threshold_bytes: TRIM_AGGRESSIVE_THRESHOLD_BYTES,
        }
    }
}

/// One recorded trim
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimEvent {
    pub before_bytes: u64,
    pub after_bytes: u64,
    pub effectiveness: f64,
}

/// Why a trim was allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimReason {
    Growth,
    Aggressive,
    IntervalElapsed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimStats {
    pub total_trims: u64,
    pub total_freed_mb: f64,
    pub significant_trims: u64,
}

struct PidTrimState {
    /// Last trim, or first observation before any trim
    reference: Instant,
    interval: Duration,
    /// Post-trim reading, or the first observed size
    baseline_bytes: u64,
    background_since: Option<Instant>,
    history: HeapRb<TrimEvent>,
}

impl PidTrimState {
    fn new(now: Instant, interval: Duration, baseline_bytes: u64) -> Self {
        Self {
            reference: now,
            interval,
            baseline_bytes,
            background_since: None,
            history: HeapRb::new(TRIM_HISTORY_LEN),
        }
    }
}

/// Adaptive working-set trimmer
pub struct WorkingSetTrimmer {
    policy: TrimPolicy,
    states: Mutex<HashMap<Pid, PidTrimState, RandomState>>,
    stats: Mutex<TrimStats>,
}

impl WorkingSetTrimmer {
    pub fn new() -> Self {
        Self::with_policy(TrimPolicy::default())
    }

    pub fn with_policy(policy: TrimPolicy) -> Self {
        Self {
            policy,
            states: Mutex::new(HashMap::with_hasher(RandomState::new())),
            stats: Mutex::new(TrimStats::default()),
        }
    }

    pub fn policy(&self) -> &TrimPolicy {
        &self.policy
    }

    /// Track role; background time starts at the first background sighting
    pub fn mark_foreground(&self, pid: Pid, is_foreground: bool, now: Instant) {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(&pid) else {
            if !is_foreground {
                let mut state = PidTrimState::new(now, self.policy.default_interval, 0);
                state.background_since = Some(now);
                // Baseline is recorded by the first `should_trim`
                state.baseline_bytes = u64::MAX;
                states.insert(pid, state);
            }
            return;
        };
        if is_foreground {
            state.background_since = None;
        } else if state.background_since.is_none() {
            state.background_since = Some(now);
        }
    }

    /// Decide whether `pid` should be trimmed now
    pub fn should_trim(&self, pid: Pid, rss_bytes: u64, now: Instant) -> bool {
        self.trim_reason(pid, rss_bytes, now).is_some()
    }

    pub fn trim_reason(&self, pid: Pid, rss_bytes: u64, now: Instant) -> Option<TrimReason> {
        let mut states = self.states.lock();
        let state = match states.get_mut(&pid) {
            Some(state) if state.baseline_bytes != u64::MAX => state,
            Some(state) => {
                state.baseline_bytes = rss_bytes;
                trace!(pid, rss_bytes, "Trim baseline recorded");
                return None;
            }
            None => {
                states.insert(pid, PidTrimState::new(now, self.policy.default_interval, rss_bytes));
                trace!(pid, rss_bytes, "Trim baseline recorded");
                return None;
            }
        };

        let since = state.background_since?;
        if now.saturating_duration_since(since) < self.policy.min_background_time {
            return None;
        }
        if now.saturating_duration_since(state.reference) < state.interval {
            return None;
        }

        let growth = if state.baseline_bytes == 0 {
            0.0
        } else {
            (rss_bytes as f64 - state.baseline_bytes as f64) / state.baseline_bytes as f64 * 100.0
        };
        let reason = if growth > self.policy.growth_threshold_percent {
            TrimReason::Growth
        } else if rss_bytes > self.policy.aggressive_threshold_bytes {
            TrimReason::Aggressive
        } else {
            TrimReason::IntervalElapsed
        };
        Some(reason)
    }

    /// Record a completed trim and adapt the interval; returns effectiveness in percent
    pub fn record_trim(&self, pid: Pid, before_bytes: u64, after_bytes: u64, now: Instant) -> f64 {
        let freed = before_bytes.saturating_sub(after_bytes);
        let effectiveness = if before_bytes == 0 {
            0.0
        } else {
            freed as f64 / before_bytes as f64 * 100.0
        };

        let mut states = self.states.lock();
        let state = states
            .entry(pid)
            .or_insert_with(|| PidTrimState::new(now, self.policy.default_interval, after_bytes));

        state.history.push_overwrite(TrimEvent {
            before_bytes,
            after_bytes,
            effectiveness,
        });

        let factor = if effectiveness > TRIM_EFFECTIVE_PERCENT {
            TRIM_SHRINK_FACTOR
        } else if effectiveness < TRIM_INEFFECTIVE_PERCENT {
            TRIM_GROW_FACTOR
        } else {
            1.0
        };
        state.interval = state
            .interval
            .mul_f64(factor)
            .clamp(self.policy.min_interval, self.policy.max_interval);
        state.reference = now;
        state.baseline_bytes = after_bytes;
        let interval = state.interval;
        drop(states);

        let mut stats = self.stats.lock();
        stats.total_trims += 1;
        stats.total_freed_mb += freed as f64 / BYTES_PER_MB;
        if effectiveness > TRIM_SIGNIFICANT_PERCENT {
            stats.significant_trims += 1;
        }

        debug!(
            pid,
            effectiveness,
            interval_secs = interval.as_secs_f64(),
            "Working set trimmed"
        );
        effectiveness
    }

    pub fn interval(&self, pid: Pid) -> Option<Duration> {
        self.states.lock().get(&pid).map(|s| s.interval)
    }

    /// Recent trims for `pid`, oldest first
    pub fn history(&self, pid: Pid) -> Vec<TrimEvent> {
        self.states
            .lock()
            .get(&pid)
            .map(|s| s.history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn forget(&self, pid: Pid) {
        self.states.lock().remove(&pid);
    }

    /// Drop state for pids not in `alive`
    pub fn retain<F: Fn(Pid) -> bool>(&self, alive: F) -> usize {
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|pid, _| alive(*pid));
        before - states.len()
    }

    pub fn tracked(&self) -> usize {
        self.states.lock().len()
    }

    pub fn stats(&self) -> TrimStats {
        *self.stats.lock()
    }
}

impl Default for WorkingSetTrimmer {
    fn default() -> Self {
        Self::new()
    }
}
