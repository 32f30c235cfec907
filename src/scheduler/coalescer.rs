/*!
 * Timer Coalescer
 * Many periodic maintenance needs on one adaptive wake timer
 *
 * Each tick the owner asks for `tasks_due`, runs them serially, reports their
 * cost through `mark_executed`, and sleeps for `next_wake`.
 */

use super::task::{CoalescedTask, TaskSpec};
use crate::core::errors::{OptimizerError, Result};
use crate::core::limits::{IDLE_WAKE, MAX_WAKE, MIN_WAKE};
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// A task selected for execution this tick
#[derive(Debug, Clone, PartialEq)]
pub struct DueTask {
    pub name: String,
    pub urgency: f64,
    /// Past its deadline, as opposed to pulled forward by coalescing
    pub overdue: bool,
}

/// Coalescer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerStats {
    pub registered: usize,
    pub total_executed: u64,
    /// Executions that ran ahead of their deadline to share a wake-up
    pub total_coalesced: u64,
}

/// Adaptive coalescing scheduler for named periodic tasks
#[derive(Debug, Default)]
pub struct TimerCoalescer {
    tasks: Vec<CoalescedTask>,
    index: HashMap<String, usize, RandomState>,
    next_sequence: u64,
    total_executed: u64,
    total_coalesced: u64,
}

impl TimerCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, first due one interval from `now`
    ///
    /// Registering an existing name replaces it.
    pub fn register(&mut self, spec: TaskSpec, now: Instant) -> Result<()> {
        if spec.interval.is_zero() {
            return Err(OptimizerError::Internal(format!(
                "task {} registered with a zero interval",
                spec.name
            )));
        }

        debug!(
            task = %spec.name,
            interval_ms = spec.interval.as_millis() as u64,
            priority = spec.priority,
            adaptive = spec.adaptive,
            "Registered coalesced task"
        );

        match self.index.get(&spec.name) {
            Some(&slot) => {
                let sequence = self.tasks[slot].sequence;
                self.tasks[slot] = CoalescedTask::from_spec(spec, now, sequence);
            }
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.index.insert(spec.name.clone(), self.tasks.len());
                self.tasks.push(CoalescedTask::from_spec(spec, now, sequence));
            }
        }
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(slot) = self.index.remove(name) else {
            return false;
        };
        self.tasks.remove(slot);
        for (i, task) in self.tasks.iter().enumerate().skip(slot) {
            self.index.insert(task.name.clone(), i);
        }
        true
    }

    pub fn task(&self, name: &str) -> Option<&CoalescedTask> {
        self.index.get(name).map(|&slot| &self.tasks[slot])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks that are due or inside their coalescence window, most urgent first
    ///
    /// Equal urgency falls back to priority, then registration order.
    pub fn tasks_due(&self, now: Instant) -> Vec<DueTask> {
        let mut due: Vec<(&CoalescedTask, f64, bool)> = self
            .tasks
            .iter()
            .filter_map(|task| task.urgency(now).map(|(u, overdue)| (task, u, overdue)))
            .collect();

        due.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.0.priority.cmp(&a.0.priority))
                .then_with(|| a.0.sequence.cmp(&b.0.sequence))
        });

        due.into_iter()
            .map(|(task, urgency, overdue)| DueTask {
                name: task.name.clone(),
                urgency,
                overdue,
            })
            .collect()
    }

    /// Record an execution; returns false for unknown names
    pub fn mark_executed(&mut self, name: &str, cost: Duration, now: Instant) -> bool {
        let Some(&slot) = self.index.get(name) else {
            return false;
        };
        let task = &mut self.tasks[slot];
        if now < task.next_execution {
            self.total_coalesced += 1;
        }
        self.total_executed += 1;
        task.record_execution(cost, now);
        true
    }

    /// Earliest deadline across all tasks
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.next_execution).min()
    }

    /// How long the main loop should sleep
    pub fn next_wake(&self, now: Instant) -> Duration {
        match self.next_deadline() {
            None => IDLE_WAKE,
            Some(deadline) => deadline
                .saturating_duration_since(now)
                .clamp(MIN_WAKE, MAX_WAKE),
        }
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            registered: self.tasks.len(),
            total_executed: self.total_executed,
            total_coalesced: self.total_coalesced,
        }
    }
}
