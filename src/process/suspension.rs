/*!
 * Suspension Manager
 * Idempotent suspend/resume of long-inactive background processes
 */

use super::handle_cache::HandleCache;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::limits::SUSPENSION_INACTIVITY_THRESHOLD;
use crate::core::types::{AccessMask, Pid};
use crate::platform::ProcessPlatform;
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionStats {
    pub currently_suspended: usize,
    pub suspensions: u64,
    pub resumes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Inner {
    suspended: HashMap<Pid, Instant, RandomState>,
    suspensions: u64,
    resumes: u64,
    failures: u64,
}

/// Tracks which pids this process has suspended
pub struct SuspensionManager {
    platform: Arc<dyn ProcessPlatform>,
    handles: Arc<HandleCache>,
    inactivity_threshold: Duration,
    inner: Mutex<Inner>,
}

impl SuspensionManager {
    pub fn new(platform: Arc<dyn ProcessPlatform>, handles: Arc<HandleCache>) -> Self {
        Self::with_threshold(platform, handles, SUSPENSION_INACTIVITY_THRESHOLD)
    }

    pub fn with_threshold(
        platform: Arc<dyn ProcessPlatform>,
        handles: Arc<HandleCache>,
        inactivity_threshold: Duration,
    ) -> Self {
        Self {
            platform,
            handles,
            inactivity_threshold,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Continuously in the background longer than the threshold
    pub fn should_suspend(&self, background_since: Option<Instant>, now: Instant) -> bool {
        background_since
            .map(|since| now.saturating_duration_since(since) > self.inactivity_threshold)
            .unwrap_or(false)
    }

    /// Suspend `pid`; `Ok(false)` when it already was
    pub fn suspend(&self, pid: Pid, now: Instant) -> PlatformResult<bool> {
        if self.is_suspended(pid) {
            return Ok(false);
        }
        let result = self.with_handle(pid, |platform, handle| platform.suspend(handle));
        let mut inner = self.inner.lock();
        match result {
            Ok(()) => {
                inner.suspended.insert(pid, now);
                inner.suspensions += 1;
                info!(pid, "Process suspended");
                Ok(true)
            }
            Err(e) => {
                inner.failures += 1;
                debug!(pid, error = %e, "Suspend failed");
                Err(e)
            }
        }
    }

    /// Resume `pid`; `Ok(false)` when it was not suspended by us
    pub fn resume(&self, pid: Pid) -> PlatformResult<bool> {
        if !self.is_suspended(pid) {
            return Ok(false);
        }
        let result = self.with_handle(pid, |platform, handle| platform.resume(handle));
        let mut inner = self.inner.lock();
        match result {
            Ok(()) => {
                inner.suspended.remove(&pid);
                inner.resumes += 1;
                info!(pid, "Process resumed");
                Ok(true)
            }
            Err(PlatformError::NotFound(_)) => {
                inner.suspended.remove(&pid);
                Ok(false)
            }
            Err(e) => {
                inner.failures += 1;
                debug!(pid, error = %e, "Resume failed");
                Err(e)
            }
        }
    }

    /// Resume everything; used on shutdown
    pub fn resume_all(&self) -> usize {
        self.suspended_pids()
            .into_iter()
            .filter(|pid| matches!(self.resume(*pid), Ok(true)))
            .count()
    }

    pub fn is_suspended(&self, pid: Pid) -> bool {
        self.inner.lock().suspended.contains_key(&pid)
    }

    pub fn suspended_for(&self, pid: Pid, now: Instant) -> Option<Duration> {
        self.inner
            .lock()
            .suspended
            .get(&pid)
            .map(|at| now.saturating_duration_since(*at))
    }

    pub fn suspended_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.inner.lock().suspended.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Forget pids that are gone
    pub fn retain<F: Fn(Pid) -> bool>(&self, alive: F) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.suspended.len();
        inner.suspended.retain(|pid, _| alive(*pid));
        before - inner.suspended.len()
    }

    pub fn stats(&self) -> SuspensionStats {
        let inner = self.inner.lock();
        SuspensionStats {
            currently_suspended: inner.suspended.len(),
            suspensions: inner.suspensions,
            resumes: inner.resumes,
            failures: inner.failures,
        }
    }

    fn with_handle<F>(&self, pid: Pid, op: F) -> PlatformResult<()>
    where
        F: FnOnce(&dyn ProcessPlatform, &crate::platform::ProcessHandle) -> PlatformResult<()>,
    {
        let handle = self
            .handles
            .get_handle(pid, AccessMask::SUSPEND_RESUME)
            .ok_or(PlatformError::InvalidHandle(pid))?;
        op(self.platform.as_ref(), &handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformCall, ProcessEntry, SimulationPlatform};

    fn setup() -> (Arc<SimulationPlatform>, SuspensionManager) {
        let sim = Arc::new(SimulationPlatform::new());
        sim.spawn(ProcessEntry::new(5, 1, "idle-app"));
        let handles = Arc::new(HandleCache::new(sim.clone()));
        let manager = SuspensionManager::new(sim.clone(), handles);
        (sim, manager)
    }

    #[test]
    fn test_suspend_and_resume_idempotent() {
        let (sim, manager) = setup();
        let now = Instant::now();
        assert!(manager.suspend(5, now).unwrap());
        assert!(!manager.suspend(5, now).unwrap());
        assert!(sim.is_suspended(5));

        assert!(manager.resume(5).unwrap());
        assert!(!manager.resume(5).unwrap());
        assert!(!sim.is_suspended(5));

        let suspend_calls = sim
            .actuation_calls()
            .iter()
            .filter(|c| matches!(c, PlatformCall::Suspend { .. } | PlatformCall::Resume { .. }))
            .count();
        assert_eq!(suspend_calls, 2);
    }

    #[test]
    fn test_should_suspend_threshold() {
        let (_sim, manager) = setup();
        let now = Instant::now();
        assert!(!manager.should_suspend(None, now));
        assert!(!manager.should_suspend(Some(now), now + Duration::from_secs(3600)));
        assert!(manager.should_suspend(Some(now), now + Duration::from_secs(3601)));
    }

    #[test]
    fn test_suspend_failure_counted() {
        let (_sim, manager) = setup();
        assert!(manager.suspend(77, Instant::now()).is_err());
        assert_eq!(manager.stats().failures, 1);
        assert!(!manager.is_suspended(77));
    }

    #[test]
    fn test_resume_all() {
        let (sim, manager) = setup();
        sim.spawn(ProcessEntry::new(6, 1, "other"));
        let now = Instant::now();
        manager.suspend(5, now).unwrap();
        manager.suspend(6, now).unwrap();
        assert_eq!(manager.resume_all(), 2);
        assert!(manager.suspended_pids().is_empty());
    }
}
