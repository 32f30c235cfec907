/*!
 * Job Table
 * CPU-rate containers shared by processes with the same name and session
 */

use super::handle_cache::HandleCache;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::limits::{
    JOB_BACKGROUND_CPU_RATE, JOB_CONTENDED_CPU_RATE, JOB_CONTENTION_THRESHOLD,
    JOB_FOREGROUND_CPU_RATE,
};
use crate::core::types::{AccessMask, Pid, ProcessName, Role, SessionId};
use crate::platform::{JobHandle, ProcessEntry, ProcessPlatform};
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Jobs are keyed by lowercase process name and session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub name: ProcessName,
    pub session: SessionId,
}

impl JobKey {
    pub fn new(name: &str, session: SessionId) -> Self {
        Self {
            name: name.to_lowercase().into(),
            session,
        }
    }

    /// Key for a process; unknown processes get a key of their own
    pub fn for_process(pid: Pid, entry: Option<&ProcessEntry>) -> Self {
        match entry {
            Some(entry) => Self::new(&entry.name, entry.session),
            None => Self::new(&pid.to_string(), 0),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.session)
    }
}

/// CPU-rate limits per role
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobRates {
    pub foreground: u32,
    pub background: u32,
    pub contended: u32,
    /// Total CPU percent at which background jobs get the contended rate
    pub contention_threshold: f32,
}

impl Default for JobRates {
    fn default() -> Self {
        Self {
            foreground: JOB_FOREGROUND_CPU_RATE,
            background: JOB_BACKGROUND_CPU_RATE,
            contended: JOB_CONTENDED_CPU_RATE,
            contention_threshold: JOB_CONTENTION_THRESHOLD,
        }
    }
}

impl JobRates {
    pub fn rate_for(&self, role: Role, total_cpu_usage: f32) -> u32 {
        match role {
            Role::Foreground => self.foreground,
            Role::Background if total_cpu_usage < self.contention_threshold => self.background,
            Role::Background => self.contended,
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    handle: JobHandle,
    role: Option<Role>,
    cpu_rate: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobKey, JobEntry, RandomState>,
    pid_to_job: HashMap<Pid, JobKey, RandomState>,
}

/// Lazily created jobs and the pids assigned to them
pub struct JobTable {
    platform: Arc<dyn ProcessPlatform>,
    handles: Arc<HandleCache>,
    rates: JobRates,
    inner: Mutex<Inner>,
}

impl JobTable {
    pub fn new(platform: Arc<dyn ProcessPlatform>, handles: Arc<HandleCache>) -> Self {
        Self::with_rates(platform, handles, JobRates::default())
    }

    pub fn with_rates(platform: Arc<dyn ProcessPlatform>, handles: Arc<HandleCache>, rates: JobRates) -> Self {
        Self {
            platform,
            handles,
            rates,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create the job for `key` if needed and bring its CPU rate in line with `role`
    ///
    /// The rate is recomputed only when the role differs from the last one applied.
    /// Platform calls run without the table lock held.
    pub fn ensure_job(&self, key: &JobKey, role: Role) -> Option<JobHandle> {
        let existing = self
            .inner
            .lock()
            .jobs
            .get(key)
            .map(|e| (e.handle.clone(), e.role));
        let (handle, last_role) = match existing {
            Some(found) => found,
            None => self.create_job(key)?,
        };

        if last_role != Some(role) {
            self.update_rate(key, &handle, role);
        }
        Some(handle)
    }

    fn create_job(&self, key: &JobKey) -> Option<(JobHandle, Option<Role>)> {
        let created = match self.platform.create_job(&format!("optimizer_{}", key)) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(job = %key, error = %e, "Failed to create job");
                return None;
            }
        };

        let (winner, role) = {
            let mut inner = self.inner.lock();
            let entry = inner.jobs.entry(key.clone()).or_insert_with(|| JobEntry {
                handle: created.clone(),
                role: None,
                cpu_rate: None,
            });
            (entry.handle.clone(), entry.role)
        };

        if winner != created {
            // Another caller created the job first
            if let Err(e) = self.platform.close_job(&created) {
                debug!(job = %key, error = %e, "Failed to close duplicate job");
            }
        } else {
            debug!(job = %key, id = created.id, "Job created");
        }
        Some((winner, role))
    }

    fn update_rate(&self, key: &JobKey, handle: &JobHandle, role: Role) {
        let usage = match role {
            Role::Foreground => 0.0,
            Role::Background => self.platform.total_cpu_usage().unwrap_or(0.0),
        };
        let rate = self.rates.rate_for(role, usage);
        if let Err(e) = self.platform.set_job_cpu_rate(handle, rate) {
            debug!(job = %key, error = %e, "Failed to set job CPU rate");
            return;
        }

        if let Some(entry) = self.inner.lock().jobs.get_mut(key) {
            if entry.handle == *handle {
                entry.role = Some(role);
                entry.cpu_rate = Some(rate);
            }
        }
        info!(job = %key, ?role, rate, "Job CPU rate updated");
    }

    /// Assign `pid` to the job for `key`; a pid already assigned is never moved
    pub fn assign(&self, pid: Pid, key: &JobKey) -> PlatformResult<bool> {
        let job = {
            let inner = self.inner.lock();
            if inner.pid_to_job.contains_key(&pid) {
                return Ok(false);
            }
            inner
                .jobs
                .get(key)
                .map(|e| e.handle.clone())
                .ok_or_else(|| PlatformError::InvalidArgument(format!("no job for {}", key)))?
        };

        let handle = self
            .handles
            .get_handle(pid, AccessMask::SET_QUOTA | AccessMask::TUNE)
            .ok_or(PlatformError::InvalidHandle(pid))?;
        self.platform.assign_to_job(&job, &handle)?;

        self.inner.lock().pid_to_job.insert(pid, key.clone());
        debug!(pid, job = %key, "Process assigned to job");
        Ok(true)
    }

    pub fn job_of(&self, pid: Pid) -> Option<JobKey> {
        self.inner.lock().pid_to_job.get(&pid).cloned()
    }

    pub fn job(&self, key: &JobKey) -> Option<JobHandle> {
        self.inner.lock().jobs.get(key).map(|e| e.handle.clone())
    }

    pub fn cpu_rate(&self, key: &JobKey) -> Option<u32> {
        self.inner.lock().jobs.get(key).and_then(|e| e.cpu_rate)
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.inner.lock().pid_to_job.len()
    }

    /// Drop assignments of pids that are gone
    pub fn retain<F: Fn(Pid) -> bool>(&self, alive: F) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pid_to_job.len();
        inner.pid_to_job.retain(|pid, _| alive(*pid));
        before - inner.pid_to_job.len()
    }

    /// Close every job; used on shutdown
    pub fn close_all(&self) {
        let jobs: Vec<(JobKey, JobEntry)> = {
            let mut inner = self.inner.lock();
            inner.pid_to_job.clear();
            inner.jobs.drain().collect()
        };
        for (key, entry) in jobs {
            if let Err(e) = self.platform.close_job(&entry.handle) {
                debug!(job = %key, error = %e, "Failed to close job");
            }
        }
    }
}
