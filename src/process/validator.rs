/*!
 * Integrity Validator
 * Reads applied settings back and keeps a bounded record of the outcome
 */

use super::handle_cache::HandleCache;
use crate::core::limits::VALIDATION_HISTORY_LEN;
use crate::core::types::{AccessMask, CoreSet, Pid, PriorityClass};
use crate::platform::ProcessPlatform;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Priority,
    Affinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub pid: Pid,
    pub kind: ValidationKind,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    /// Over the retained history, in percent
    pub success_rate: f64,
}

struct Inner {
    history: HeapRb<ValidationRecord>,
    total: u64,
    passed: u64,
}

/// Post-apply read-back checks; nothing is rolled back
pub struct IntegrityValidator {
    platform: Arc<dyn ProcessPlatform>,
    handles: Arc<HandleCache>,
    inner: Mutex<Inner>,
}

impl IntegrityValidator {
    pub fn new(platform: Arc<dyn ProcessPlatform>, handles: Arc<HandleCache>) -> Self {
        Self {
            platform,
            handles,
            inner: Mutex::new(Inner {
                history: HeapRb::new(VALIDATION_HISTORY_LEN),
                total: 0,
                passed: 0,
            }),
        }
    }

    /// Returns `None` when the value could not be read back
    pub fn validate_priority(&self, pid: Pid, expected: PriorityClass) -> Option<bool> {
        let handle = self.handles.get_handle(pid, AccessMask::TUNE)?;
        let actual = match self.platform.query_priority_class(&handle) {
            Ok(actual) => actual,
            Err(e) => {
                debug!(pid, error = %e, "Priority read-back failed");
                return None;
            }
        };
        let passed = actual == expected;
        if !passed {
            info!(pid, ?expected, ?actual, "Priority did not stick");
        }
        self.record(pid, ValidationKind::Priority, passed);
        Some(passed)
    }

    pub fn validate_affinity(&self, pid: Pid, expected: &CoreSet) -> Option<bool> {
        let handle = self.handles.get_handle(pid, AccessMask::TUNE)?;
        let actual = match self.platform.query_affinity(&handle) {
            Ok(actual) => actual,
            Err(e) => {
                debug!(pid, error = %e, "Affinity read-back failed");
                return None;
            }
        };
        let passed = &actual == expected;
        if !passed {
            info!(pid, expected = %expected, actual = %actual, "Affinity did not stick");
        }
        self.record(pid, ValidationKind::Affinity, passed);
        Some(passed)
    }

    fn record(&self, pid: Pid, kind: ValidationKind, passed: bool) {
        let mut inner = self.inner.lock();
        inner.history.push_overwrite(ValidationRecord { pid, kind, passed });
        inner.total += 1;
        if passed {
            inner.passed += 1;
        }
    }

    /// Retained records, oldest first
    pub fn history(&self) -> Vec<ValidationRecord> {
        self.inner.lock().history.iter().copied().collect()
    }

    pub fn stats(&self) -> ValidationStats {
        let inner = self.inner.lock();
        let retained = inner.history.occupied_len();
        let retained_passed = inner.history.iter().filter(|r| r.passed).count();
        ValidationStats {
            total: inner.total,
            passed: inner.passed,
            failed: inner.total - inner.passed,
            success_rate: if retained == 0 {
                100.0
            } else {
                retained_passed as f64 / retained as f64 * 100.0
            },
        }
    }
}
