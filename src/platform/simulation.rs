/*!
 * Simulation Platform
 * In-memory process table that records every state-changing call
 *
 * Used as the fallback backend on hosts without a native implementation
 * and by the test-suite to observe exactly which OS calls the core issues.
 */

use super::traits::*;
use super::types::*;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::types::{
    AccessMask, CoreSet, IoPriority, PagePriority, Pid, PriorityClass, Tid,
};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

/// A state-changing call observed by the simulation
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Open { pid: Pid, access: AccessMask },
    Close { pid: Pid },
    SetAffinity { pid: Pid, cores: CoreSet },
    SetThreadAffinity { pid: Pid, tid: Tid, cores: CoreSet },
    SetPriorityClass { pid: Pid, class: PriorityClass },
    SetIoPriority { pid: Pid, level: IoPriority },
    SetThreadIoPriority { pid: Pid, tid: Tid, level: IoPriority },
    SetPagePriority { pid: Pid, level: PagePriority },
    SetPriorityBoost { pid: Pid, disable: bool },
    SetEcoQos { pid: Pid, enabled: bool },
    TrimWorkingSet { pid: Pid },
    Suspend { pid: Pid },
    Resume { pid: Pid },
    EnableLargePages { pid: Pid },
    SetPreferredNumaNode { pid: Pid, node: usize },
    ClearStandbyCache,
    SetTurbo { enabled: bool },
    CreateJob { name: String },
    AssignToJob { job: u64, pid: Pid },
    SetJobCpuRate { job: u64, percent: u32 },
    CloseJob { job: u64 },
}

impl PlatformCall {
    /// Pid the call acted on, if any
    pub fn pid(&self) -> Option<Pid> {
        match self {
            PlatformCall::Open { pid, .. }
            | PlatformCall::Close { pid }
            | PlatformCall::SetAffinity { pid, .. }
            | PlatformCall::SetThreadAffinity { pid, .. }
            | PlatformCall::SetPriorityClass { pid, .. }
            | PlatformCall::SetIoPriority { pid, .. }
            | PlatformCall::SetThreadIoPriority { pid, .. }
            | PlatformCall::SetPagePriority { pid, .. }
            | PlatformCall::SetPriorityBoost { pid, .. }
            | PlatformCall::SetEcoQos { pid, .. }
            | PlatformCall::TrimWorkingSet { pid }
            | PlatformCall::Suspend { pid }
            | PlatformCall::Resume { pid }
            | PlatformCall::EnableLargePages { pid }
            | PlatformCall::SetPreferredNumaNode { pid, .. }
            | PlatformCall::AssignToJob { pid, .. } => Some(*pid),
            _ => None,
        }
    }

    /// Everything except handle bookkeeping changes OS state
    pub fn is_actuation(&self) -> bool {
        !matches!(self, PlatformCall::Open { .. } | PlatformCall::Close { .. })
    }
}

/// Simulated process
#[derive(Debug, Clone)]
pub struct SimProcess {
    pub entry: ProcessEntry,
    pub rss_bytes: u64,
    pub threads: Vec<Tid>,
    pub affinity: CoreSet,
    pub priority: PriorityClass,
    pub suspended: bool,
}

#[derive(Debug, Clone)]
struct SimJob {
    cpu_rate: Option<u32>,
    members: Vec<Pid>,
}

/// Simulation backend
pub struct SimulationPlatform {
    cores: usize,
    processes: RwLock<HashMap<Pid, SimProcess, RandomState>>,
    handles: DashMap<i64, Pid, RandomState>,
    next_handle: AtomicI64,
    jobs: DashMap<u64, SimJob, RandomState>,
    next_job: AtomicU64,
    calls: Mutex<Vec<PlatformCall>>,
    failures: DashMap<(Pid, &'static str), PlatformError, RandomState>,
    foreground: Mutex<Option<Pid>>,
    cpu_usage: Mutex<f32>,
    memory: Mutex<MemoryStatus>,
    trim_yield: Mutex<f64>,
}

impl SimulationPlatform {
    pub fn new() -> Self {
        Self::with_cores(8)
    }

    pub fn with_cores(cores: usize) -> Self {
        info!(cores, "Process platform initialized (simulation mode)");
        Self {
            cores: cores.max(1),
            processes: RwLock::new(HashMap::with_hasher(RandomState::new())),
            handles: DashMap::with_hasher(RandomState::new()),
            next_handle: AtomicI64::new(1),
            jobs: DashMap::with_hasher(RandomState::new()),
            next_job: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            failures: DashMap::with_hasher(RandomState::new()),
            foreground: Mutex::new(None),
            cpu_usage: Mutex::new(0.0),
            memory: Mutex::new(MemoryStatus {
                total_bytes: 16 * 1024 * 1024 * 1024,
                available_bytes: 8 * 1024 * 1024 * 1024,
                cached_bytes: 2 * 1024 * 1024 * 1024,
            }),
            trim_yield: Mutex::new(0.3),
        }
    }

    /// Add a process with one thread and 64MB resident
    pub fn spawn(&self, entry: ProcessEntry) {
        self.spawn_with(entry, 1, 64 * 1024 * 1024);
    }

    pub fn spawn_with(&self, entry: ProcessEntry, threads: usize, rss_bytes: u64) {
        let pid = entry.pid;
        let thread_ids = std::iter::once(pid)
            .chain((1..threads as u32).map(|i| pid.saturating_mul(1000).saturating_add(i)))
            .collect();
        self.processes.write().insert(
            pid,
            SimProcess {
                entry,
                rss_bytes,
                threads: thread_ids,
                affinity: CoreSet::all(self.cores),
                priority: PriorityClass::Normal,
                suspended: false,
            },
        );
    }

    /// Remove a process as if it exited
    pub fn kill(&self, pid: Pid) {
        self.processes.write().remove(&pid);
    }

    pub fn set_rss(&self, pid: Pid, rss_bytes: u64) {
        if let Some(process) = self.processes.write().get_mut(&pid) {
            process.rss_bytes = rss_bytes;
        }
    }

    /// Fraction of resident memory released by a trim
    pub fn set_trim_yield(&self, fraction: f64) {
        *self.trim_yield.lock() = fraction.clamp(0.0, 1.0);
    }

    pub fn set_foreground(&self, pid: Option<Pid>) {
        *self.foreground.lock() = pid;
    }

    pub fn set_cpu_usage(&self, percent: f32) {
        *self.cpu_usage.lock() = percent;
    }

    pub fn set_memory_status(&self, status: MemoryStatus) {
        *self.memory.lock() = status;
    }

    /// Make `operation` fail for `pid` until cleared
    pub fn fail(&self, pid: Pid, operation: &'static str, error: PlatformError) {
        self.failures.insert((pid, operation), error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    pub fn process(&self, pid: Pid) -> Option<SimProcess> {
        self.processes.read().get(&pid).cloned()
    }

    pub fn is_suspended(&self, pid: Pid) -> bool {
        self.processes
            .read()
            .get(&pid)
            .map(|p| p.suspended)
            .unwrap_or(false)
    }

    /// Number of OS handles currently open
    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn job_cpu_rate(&self, job: &JobHandle) -> Option<u32> {
        self.jobs.get(&job.id).and_then(|j| j.cpu_rate)
    }

    pub fn job_members(&self, job: &JobHandle) -> Vec<Pid> {
        self.jobs
            .get(&job.id)
            .map(|j| j.members.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// State-changing calls only
    pub fn actuation_calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_actuation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().push(call);
    }

    fn check(&self, pid: Pid, operation: &'static str) -> PlatformResult<()> {
        if let Some(err) = self.failures.get(&(pid, operation)) {
            return Err(err.value().clone());
        }
        if !self.processes.read().contains_key(&pid) {
            return Err(PlatformError::NotFound(pid));
        }
        Ok(())
    }

    fn check_handle(&self, handle: &ProcessHandle, operation: &'static str) -> PlatformResult<()> {
        if !self.handles.contains_key(&handle.raw().0) {
            return Err(PlatformError::InvalidHandle(handle.pid()));
        }
        self.check(handle.pid(), operation)
    }

    fn owner_of(&self, tid: Tid) -> Option<Pid> {
        self.processes
            .read()
            .values()
            .find(|p| p.threads.contains(&tid))
            .map(|p| p.entry.pid)
    }

    fn update<F: FnOnce(&mut SimProcess)>(&self, pid: Pid, f: F) {
        if let Some(process) = self.processes.write().get_mut(&pid) {
            f(process);
        }
    }
}

impl Default for SimulationPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessPlatform for SimulationPlatform {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn is_supported(&self) -> bool {
        true // Always available as fallback
    }

    fn enumerate_processes(&self) -> PlatformResult<Vec<ProcessEntry>> {
        let mut entries: Vec<ProcessEntry> = self
            .processes
            .read()
            .values()
            .map(|p| p.entry.clone())
            .collect();
        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }

    fn pid_exists(&self, pid: Pid) -> bool {
        self.processes.read().contains_key(&pid)
    }

    fn list_threads(&self, pid: Pid) -> PlatformResult<Vec<Tid>> {
        self.check(pid, "list_threads")?;
        Ok(self
            .processes
            .read()
            .get(&pid)
            .map(|p| p.threads.clone())
            .unwrap_or_default())
    }

    fn memory_usage(&self, pid: Pid) -> PlatformResult<u64> {
        self.check(pid, "memory_usage")?;
        Ok(self
            .processes
            .read()
            .get(&pid)
            .map(|p| p.rss_bytes)
            .unwrap_or(0))
    }

    fn total_cpu_usage(&self) -> PlatformResult<f32> {
        Ok(*self.cpu_usage.lock())
    }

    fn memory_status(&self) -> PlatformResult<MemoryStatus> {
        Ok(*self.memory.lock())
    }

    fn foreground_pid(&self) -> PlatformResult<Option<Pid>> {
        Ok(*self.foreground.lock())
    }

    fn open_process(&self, pid: Pid, access: AccessMask) -> PlatformResult<RawHandle> {
        self.check(pid, "open_process")?;
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(raw, pid);
        self.record(PlatformCall::Open { pid, access });
        Ok(RawHandle(raw))
    }

    fn close_handle(&self, pid: Pid, raw: RawHandle) -> PlatformResult<()> {
        match self.handles.remove(&raw.0) {
            Some(_) => {
                self.record(PlatformCall::Close { pid });
                Ok(())
            }
            None => Err(PlatformError::InvalidHandle(pid)),
        }
    }

    fn set_affinity(&self, handle: &ProcessHandle, cores: &CoreSet) -> PlatformResult<()> {
        self.check_handle(handle, "set_affinity")?;
        if cores.is_empty() || cores.iter().any(|c| c >= self.cores) {
            return Err(PlatformError::InvalidArgument(format!(
                "core set {} outside 0..{}",
                cores, self.cores
            )));
        }
        self.update(handle.pid(), |p| p.affinity = cores.clone());
        self.record(PlatformCall::SetAffinity {
            pid: handle.pid(),
            cores: cores.clone(),
        });
        Ok(())
    }

    fn query_affinity(&self, handle: &ProcessHandle) -> PlatformResult<CoreSet> {
        self.check_handle(handle, "query_affinity")?;
        self.process(handle.pid())
            .map(|p| p.affinity)
            .ok_or(PlatformError::NotFound(handle.pid()))
    }

    fn set_thread_affinity(&self, tid: Tid, cores: &CoreSet) -> PlatformResult<()> {
        let pid = self.owner_of(tid).ok_or(PlatformError::NotFound(tid))?;
        self.check(pid, "set_thread_affinity")?;
        self.record(PlatformCall::SetThreadAffinity {
            pid,
            tid,
            cores: cores.clone(),
        });
        Ok(())
    }

    fn set_priority_class(&self, handle: &ProcessHandle, class: PriorityClass) -> PlatformResult<()> {
        self.check_handle(handle, "set_priority_class")?;
        self.update(handle.pid(), |p| p.priority = class);
        self.record(PlatformCall::SetPriorityClass {
            pid: handle.pid(),
            class,
        });
        Ok(())
    }

    fn query_priority_class(&self, handle: &ProcessHandle) -> PlatformResult<PriorityClass> {
        self.check_handle(handle, "query_priority_class")?;
        self.process(handle.pid())
            .map(|p| p.priority)
            .ok_or(PlatformError::NotFound(handle.pid()))
    }

    fn set_io_priority(&self, handle: &ProcessHandle, level: IoPriority) -> PlatformResult<()> {
        self.check_handle(handle, "set_io_priority")?;
        self.record(PlatformCall::SetIoPriority {
            pid: handle.pid(),
            level,
        });
        Ok(())
    }

    fn set_thread_io_priority(&self, tid: Tid, level: IoPriority) -> PlatformResult<()> {
        let pid = self.owner_of(tid).ok_or(PlatformError::NotFound(tid))?;
        self.check(pid, "set_thread_io_priority")?;
        self.record(PlatformCall::SetThreadIoPriority { pid, tid, level });
        Ok(())
    }

    fn set_page_priority(&self, handle: &ProcessHandle, level: PagePriority) -> PlatformResult<()> {
        self.check_handle(handle, "set_page_priority")?;
        self.record(PlatformCall::SetPagePriority {
            pid: handle.pid(),
            level,
        });
        Ok(())
    }

    fn set_priority_boost(&self, handle: &ProcessHandle, disable: bool) -> PlatformResult<()> {
        self.check_handle(handle, "set_priority_boost")?;
        self.record(PlatformCall::SetPriorityBoost {
            pid: handle.pid(),
            disable,
        });
        Ok(())
    }

    fn set_eco_qos(&self, handle: &ProcessHandle, enabled: bool) -> PlatformResult<()> {
        self.check_handle(handle, "set_eco_qos")?;
        self.record(PlatformCall::SetEcoQos {
            pid: handle.pid(),
            enabled,
        });
        Ok(())
    }

    fn trim_working_set(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        self.check_handle(handle, "trim_working_set")?;
        let keep = 1.0 - *self.trim_yield.lock();
        self.update(handle.pid(), |p| {
            p.rss_bytes = (p.rss_bytes as f64 * keep) as u64;
        });
        self.record(PlatformCall::TrimWorkingSet { pid: handle.pid() });
        Ok(())
    }

    fn suspend(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        self.check_handle(handle, "suspend")?;
        self.update(handle.pid(), |p| p.suspended = true);
        self.record(PlatformCall::Suspend { pid: handle.pid() });
        Ok(())
    }

    fn resume(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        self.check_handle(handle, "resume")?;
        self.update(handle.pid(), |p| p.suspended = false);
        self.record(PlatformCall::Resume { pid: handle.pid() });
        Ok(())
    }

    fn enable_large_pages(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        self.check_handle(handle, "enable_large_pages")?;
        self.record(PlatformCall::EnableLargePages { pid: handle.pid() });
        Ok(())
    }

    fn set_preferred_numa_node(&self, handle: &ProcessHandle, node: usize) -> PlatformResult<()> {
        self.check_handle(handle, "set_preferred_numa_node")?;
        self.record(PlatformCall::SetPreferredNumaNode {
            pid: handle.pid(),
            node,
        });
        Ok(())
    }

    fn clear_standby_cache(&self) -> PlatformResult<()> {
        let mut memory = self.memory.lock();
        memory.available_bytes = memory.available_bytes.saturating_add(memory.cached_bytes);
        memory.cached_bytes = 0;
        drop(memory);
        self.record(PlatformCall::ClearStandbyCache);
        Ok(())
    }

    fn set_turbo(&self, enabled: bool) -> PlatformResult<()> {
        self.record(PlatformCall::SetTurbo { enabled });
        Ok(())
    }

    fn create_job(&self, name: &str) -> PlatformResult<JobHandle> {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        self.jobs.insert(
            id,
            SimJob {
                cpu_rate: None,
                members: Vec::new(),
            },
        );
        self.record(PlatformCall::CreateJob {
            name: name.to_string(),
        });
        Ok(JobHandle {
            id,
            name: name.to_string(),
        })
    }

    fn assign_to_job(&self, job: &JobHandle, handle: &ProcessHandle) -> PlatformResult<()> {
        self.check_handle(handle, "assign_to_job")?;
        let mut entry = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| PlatformError::InvalidArgument(format!("unknown job {}", job.name)))?;
        entry.members.push(handle.pid());
        drop(entry);
        self.record(PlatformCall::AssignToJob {
            job: job.id,
            pid: handle.pid(),
        });
        Ok(())
    }

    fn set_job_cpu_rate(&self, job: &JobHandle, percent: u32) -> PlatformResult<()> {
        if percent == 0 || percent > 100 {
            return Err(PlatformError::InvalidArgument(format!(
                "cpu rate {}% out of range",
                percent
            )));
        }
        let mut entry = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| PlatformError::InvalidArgument(format!("unknown job {}", job.name)))?;
        entry.cpu_rate = Some(percent);
        drop(entry);
        self.record(PlatformCall::SetJobCpuRate {
            job: job.id,
            percent,
        });
        Ok(())
    }

    fn close_job(&self, job: &JobHandle) -> PlatformResult<()> {
        self.jobs.remove(&job.id);
        self.record(PlatformCall::CloseJob { job: job.id });
        Ok(())
    }
}
