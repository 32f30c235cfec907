/*!
 * Platform Traits
 * Narrow actuation interface between the optimizer core and the OS
 */

use super::types::*;
use crate::core::errors::PlatformResult;
use crate::core::types::{
    AccessMask, CoreSet, IoPriority, PagePriority, Pid, PriorityClass, Tid,
};

/// OS backend used by every component that touches a process
///
/// Each call is independent and best-effort. Capabilities a platform lacks
/// return `PlatformError::Unsupported`.
pub trait ProcessPlatform: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether this backend can run on the current host
    fn is_supported(&self) -> bool;

    // ---------------------------------------------------------------------
    // Discovery
    // ---------------------------------------------------------------------

    /// Enumerate every running process
    fn enumerate_processes(&self) -> PlatformResult<Vec<ProcessEntry>>;

    /// Check whether a pid is still alive
    fn pid_exists(&self, pid: Pid) -> bool;

    /// List thread ids owned by a process
    fn list_threads(&self, pid: Pid) -> PlatformResult<Vec<Tid>>;

    /// Resident set size in bytes
    fn memory_usage(&self, pid: Pid) -> PlatformResult<u64>;

    /// Total CPU usage in percent since the previous call
    fn total_cpu_usage(&self) -> PlatformResult<f32>;

    /// System memory counters
    fn memory_status(&self) -> PlatformResult<MemoryStatus>;

    /// Pid owning the foreground window, if the platform has that notion
    fn foreground_pid(&self) -> PlatformResult<Option<Pid>>;

    // ---------------------------------------------------------------------
    // Handles
    // ---------------------------------------------------------------------

    /// Open an OS handle; only the handle cache calls this
    fn open_process(&self, pid: Pid, access: AccessMask) -> PlatformResult<RawHandle>;

    /// Close an OS handle; only `ProcessHandle::drop` calls this
    fn close_handle(&self, pid: Pid, raw: RawHandle) -> PlatformResult<()>;

    // ---------------------------------------------------------------------
    // Scheduling knobs
    // ---------------------------------------------------------------------

    fn set_affinity(&self, handle: &ProcessHandle, cores: &CoreSet) -> PlatformResult<()>;

    fn query_affinity(&self, handle: &ProcessHandle) -> PlatformResult<CoreSet>;

    fn set_thread_affinity(&self, tid: Tid, cores: &CoreSet) -> PlatformResult<()>;

    fn set_priority_class(&self, handle: &ProcessHandle, class: PriorityClass) -> PlatformResult<()>;

    fn query_priority_class(&self, handle: &ProcessHandle) -> PlatformResult<PriorityClass>;

    fn set_io_priority(&self, handle: &ProcessHandle, level: IoPriority) -> PlatformResult<()>;

    fn set_thread_io_priority(&self, tid: Tid, level: IoPriority) -> PlatformResult<()>;

    fn set_page_priority(&self, handle: &ProcessHandle, level: PagePriority) -> PlatformResult<()>;

    fn set_priority_boost(&self, handle: &ProcessHandle, disable: bool) -> PlatformResult<()>;

    fn set_eco_qos(&self, handle: &ProcessHandle, enabled: bool) -> PlatformResult<()>;

    // ---------------------------------------------------------------------
    // Memory and lifecycle
    // ---------------------------------------------------------------------

    fn trim_working_set(&self, handle: &ProcessHandle) -> PlatformResult<()>;

    fn suspend(&self, handle: &ProcessHandle) -> PlatformResult<()>;

    fn resume(&self, handle: &ProcessHandle) -> PlatformResult<()>;

    fn enable_large_pages(&self, handle: &ProcessHandle) -> PlatformResult<()>;

    fn set_preferred_numa_node(&self, handle: &ProcessHandle, node: usize) -> PlatformResult<()>;

    /// Drop the system standby / page cache
    fn clear_standby_cache(&self) -> PlatformResult<()>;

    /// Toggle CPU turbo / boost frequencies system-wide
    fn set_turbo(&self, enabled: bool) -> PlatformResult<()>;

    // ---------------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------------

    fn create_job(&self, name: &str) -> PlatformResult<JobHandle>;

    fn assign_to_job(&self, job: &JobHandle, handle: &ProcessHandle) -> PlatformResult<()>;

    fn set_job_cpu_rate(&self, job: &JobHandle, percent: u32) -> PlatformResult<()>;

    fn close_job(&self, job: &JobHandle) -> PlatformResult<()>;

    /// Thread count, derived from `list_threads` unless the backend knows better
    fn thread_count(&self, pid: Pid) -> PlatformResult<usize> {
        self.list_threads(pid).map(|threads| threads.len())
    }
}
