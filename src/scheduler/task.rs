/*!
 * Coalesced Task
 * Periodic unit of work with an adaptive interval
 */

use crate::core::limits::{
    ADAPTIVE_GROW_FACTOR, ADAPTIVE_HIGH_COST_RATIO, ADAPTIVE_LOW_COST_RATIO,
    ADAPTIVE_MULTIPLIER_MAX, ADAPTIVE_MULTIPLIER_MIN, ADAPTIVE_SHRINK_FACTOR,
    COALESCE_WINDOW_RATIO, EXECUTION_BUDGET_RATIO, EXECUTION_COUNT_RESET, MAX_OVERDUE_URGENCY,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Registration request for a periodic task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub interval: Duration,
    /// Weight applied to urgency inside the coalescence window
    pub priority: u32,
    pub adaptive: bool,
    /// Defaults to 10% of the interval
    pub coalescence_window: Option<Duration>,
    /// Defaults to 50% of the interval
    pub execution_budget: Option<Duration>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, interval: Duration, priority: u32) -> Self {
        Self {
            name: name.into(),
            interval,
            priority,
            adaptive: true,
            coalescence_window: None,
            execution_budget: None,
        }
    }

    /// Disable interval adaptation
    pub fn fixed(mut self) -> Self {
        self.adaptive = false;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.coalescence_window = Some(window);
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.execution_budget = Some(budget);
        self
    }
}

/// Registered task state
#[derive(Debug, Clone)]
pub struct CoalescedTask {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) priority: u32,
    pub(crate) adaptive: bool,
    base_window: Duration,
    pub(crate) coalescence_window: Duration,
    pub(crate) execution_budget: Duration,
    pub(crate) next_execution: Instant,
    avg_cost_ms: f64,
    execution_count: u64,
    pub(crate) adaptive_multiplier: f64,
    pub(crate) sequence: u64,
}

impl CoalescedTask {
    pub(crate) fn from_spec(spec: TaskSpec, now: Instant, sequence: u64) -> Self {
        let window = spec
            .coalescence_window
            .unwrap_or_else(|| spec.interval.mul_f64(COALESCE_WINDOW_RATIO))
            .max(MIN_WINDOW);
        let budget = spec
            .execution_budget
            .unwrap_or_else(|| spec.interval.mul_f64(EXECUTION_BUDGET_RATIO))
            .max(MIN_WINDOW);

        Self {
            next_execution: now + spec.interval,
            name: spec.name,
            interval: spec.interval,
            priority: spec.priority,
            adaptive: spec.adaptive,
            base_window: window,
            coalescence_window: window,
            execution_budget: budget,
            avg_cost_ms: 0.0,
            execution_count: 0,
            adaptive_multiplier: 1.0,
            sequence,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_execution(&self) -> Instant {
        self.next_execution
    }

    pub fn adaptive_multiplier(&self) -> f64 {
        self.adaptive_multiplier
    }

    pub fn coalescence_window(&self) -> Duration {
        self.coalescence_window
    }

    pub fn average_cost_ms(&self) -> f64 {
        self.avg_cost_ms
    }

    #[inline]
    fn interval_ms(&self) -> f64 {
        (self.interval.as_secs_f64() * 1000.0).max(f64::EPSILON)
    }

    /// Urgency at `now`, or `None` when the task is neither due nor in its window
    pub(crate) fn urgency(&self, now: Instant) -> Option<(f64, bool)> {
        if now >= self.next_execution {
            let overdue_ms = (now - self.next_execution).as_secs_f64() * 1000.0;
            let urgency = (overdue_ms / self.interval_ms()).min(MAX_OVERDUE_URGENCY);
            return Some((urgency, true));
        }

        let remaining = self.next_execution - now;
        if remaining <= self.coalescence_window {
            let window_ms = self.coalescence_window.as_secs_f64() * 1000.0;
            let proximity = 1.0 - (remaining.as_secs_f64() * 1000.0) / window_ms;
            return Some((self.priority as f64 * proximity, false));
        }

        None
    }

    /// Fold one execution into the rolling cost and reschedule
    pub(crate) fn record_execution(&mut self, cost: Duration, now: Instant) {
        let cost_ms = cost.as_secs_f64() * 1000.0;

        if self.execution_count >= EXECUTION_COUNT_RESET {
            self.execution_count = EXECUTION_COUNT_RESET / 2;
        }
        self.execution_count += 1;
        self.avg_cost_ms += (cost_ms - self.avg_cost_ms) / self.execution_count as f64;

        if self.adaptive {
            let budget_ms = self.execution_budget.as_secs_f64() * 1000.0;
            if self.avg_cost_ms < budget_ms * ADAPTIVE_LOW_COST_RATIO {
                self.adaptive_multiplier =
                    (self.adaptive_multiplier * ADAPTIVE_SHRINK_FACTOR).max(ADAPTIVE_MULTIPLIER_MIN);
            } else if self.avg_cost_ms > budget_ms * ADAPTIVE_HIGH_COST_RATIO {
                self.adaptive_multiplier =
                    (self.adaptive_multiplier * ADAPTIVE_GROW_FACTOR).min(ADAPTIVE_MULTIPLIER_MAX);
            }
            self.coalescence_window = self
                .base_window
                .mul_f64(self.adaptive_multiplier)
                .max(MIN_WINDOW);
        }

        self.next_execution = now + self.interval.mul_f64(self.adaptive_multiplier);
    }
}
