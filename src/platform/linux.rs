/*!
 * Linux Platform
 * procfs discovery, scheduler syscalls and cgroup v2 jobs
 *
 * Mapping of the optimizer knobs:
 * - priority class: per-thread nice value
 * - I/O priority: ioprio_set (idle / best-effort classes)
 * - eco-QoS: SCHED_BATCH vs SCHED_OTHER
 * - working-set trim: process_madvise(MADV_PAGEOUT) over private writable mappings
 * - suspend / resume: SIGSTOP / SIGCONT
 * - jobs: cgroup v2 directories with cpu.max
 * - page priority, large pages, NUMA preference: unsupported
 */

use super::traits::*;
use super::types::*;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::types::{
    AccessMask, CoreSet, IoPriority, PagePriority, Pid, PriorityClass, Tid,
};
use ahash::RandomState;
use dashmap::DashMap;
use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{Pid as NixPid, Uid, User};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

/// Highest uid treated as a system account
const SYSTEM_UID_MAX: u32 = 999;

const IOPRIO_WHO_PROCESS: libc::c_long = 1;
const IOPRIO_CLASS_SHIFT: u32 = 13;
const IOPRIO_CLASS_BE: u32 = 2;
const IOPRIO_CLASS_IDLE: u32 = 3;

const MADV_PAGEOUT: libc::c_long = 21;

/// iovecs per process_madvise call (UIO_MAXIOV is 1024)
const MADVISE_BATCH: usize = 512;

/// cpu.max period in microseconds
const CPU_MAX_PERIOD_US: u64 = 100_000;

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const CGROUP_SUBTREE: &str = "optimizer";

const TURBO_INTEL_NO_TURBO: &str = "/sys/devices/system/cpu/intel_pstate/no_turbo";
const TURBO_CPUFREQ_BOOST: &str = "/sys/devices/system/cpu/cpufreq/boost";

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Linux backend
pub struct LinuxPlatform {
    proc_root: PathBuf,
    cgroup_base: PathBuf,
    page_size: u64,
    cores: usize,
    cpu_sample: Mutex<Option<CpuTimes>>,
    users: Mutex<HashMap<u32, Option<String>, RandomState>>,
    jobs: DashMap<u64, PathBuf, RandomState>,
    next_job: AtomicU64,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        // SAFETY: sysconf has no memory-safety preconditions
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        if !Path::new(CGROUP_ROOT).join("cgroup.controllers").exists() {
            warn!("cgroups v2 not available, job CPU limits will be skipped");
        }

        info!(cores, "Process platform initialized (Linux procfs)");

        Self {
            proc_root: PathBuf::from("/proc"),
            cgroup_base: Path::new(CGROUP_ROOT).join(CGROUP_SUBTREE),
            page_size: if page_size > 0 { page_size as u64 } else { 4096 },
            cores,
            cpu_sample: Mutex::new(None),
            users: Mutex::new(HashMap::with_hasher(RandomState::new())),
            jobs: DashMap::with_hasher(RandomState::new()),
            next_job: AtomicU64::new(1),
        }
    }

    fn proc_path(&self, pid: Pid) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    fn read_entry(&self, pid: Pid) -> Option<ProcessEntry> {
        let dir = self.proc_path(pid);
        let stat = fs::read_to_string(dir.join("stat")).ok()?;
        let (comm, ppid, session) = parse_stat(&stat)?;

        let exe = fs::read_link(dir.join("exe"))
            .ok()
            .map(|p| p.to_string_lossy().into_owned());
        let name = exe
            .as_deref()
            .and_then(|e| Path::new(e).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(comm);

        let uid = fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|s| parse_uid(&s));

        let mut entry = ProcessEntry::new(pid, ppid, &name).with_session(session);
        entry.exe = exe;
        if let Some(uid) = uid {
            entry.user = self.user_name(uid);
            entry.system_account = uid <= SYSTEM_UID_MAX;
        }
        Some(entry)
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        let mut users = self.users.lock();
        users
            .entry(uid)
            .or_insert_with(|| {
                User::from_uid(Uid::from_raw(uid))
                    .ok()
                    .flatten()
                    .map(|u| u.name)
            })
            .clone()
    }

    /// Run `op` on every thread; the main thread's result decides the outcome
    fn for_each_thread<F>(&self, pid: Pid, mut op: F) -> PlatformResult<()>
    where
        F: FnMut(Tid) -> PlatformResult<()>,
    {
        op(pid)?;
        for tid in self.list_threads(pid).unwrap_or_default() {
            if tid == pid {
                continue;
            }
            if let Err(e) = op(tid) {
                trace!(pid, tid, error = %e, "thread-level call failed");
            }
        }
        Ok(())
    }

    fn set_thread_nice(&self, pid: Pid, tid: Tid, nice: i32) -> PlatformResult<()> {
        // SAFETY: plain syscall wrapper, no pointers involved
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid as libc::id_t, nice) };
        if rc != 0 {
            return Err(last_error(pid, "setpriority"));
        }
        Ok(())
    }

    fn set_thread_policy(&self, pid: Pid, tid: Tid, policy: libc::c_int) -> PlatformResult<()> {
        let param = libc::sched_param { sched_priority: 0 };
        // SAFETY: `param` outlives the call
        let rc = unsafe { libc::sched_setscheduler(tid as libc::pid_t, policy, &param) };
        if rc != 0 {
            return Err(last_error(pid, "sched_setscheduler"));
        }
        Ok(())
    }

    fn ioprio_set(&self, pid: Pid, tid: Tid, level: IoPriority) -> PlatformResult<()> {
        let value = ioprio_value(level) as libc::c_long;
        // SAFETY: ioprio_set takes only integer arguments
        let rc = unsafe {
            libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, tid as libc::c_long, value)
        };
        if rc != 0 {
            return Err(last_error(pid, "ioprio_set"));
        }
        Ok(())
    }

    fn cpu_times(&self) -> PlatformResult<CpuTimes> {
        let stat = fs::read_to_string(self.proc_root.join("stat"))?;
        let line = stat
            .lines()
            .next()
            .ok_or_else(|| PlatformError::Io("empty /proc/stat".into()))?;
        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|v| v.parse().ok())
            .collect();
        if values.len() < 4 {
            return Err(PlatformError::Io("short cpu line in /proc/stat".into()));
        }
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        Ok(CpuTimes {
            idle,
            total: values.iter().sum(),
        })
    }

    fn writable_private_ranges(&self, pid: Pid) -> PlatformResult<Vec<(usize, usize)>> {
        let maps = fs::read_to_string(self.proc_path(pid).join("maps"))
            .map_err(|e| io_error(pid, "read maps", e))?;
        Ok(maps.lines().filter_map(parse_private_writable).collect())
    }

    fn write_control_file(&self, path: &Path, value: &str) -> PlatformResult<()> {
        fs::write(path, value).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => PlatformError::access_denied(0, path.display().to_string()),
            _ => PlatformError::Io(format!("{}: {}", path.display(), e)),
        })
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessPlatform for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn is_supported(&self) -> bool {
        self.proc_root.join("self/stat").exists()
    }

    fn enumerate_processes(&self) -> PlatformResult<Vec<ProcessEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.proc_root)? {
            let Ok(dirent) = dirent else { continue };
            let Some(pid) = dirent.file_name().to_str().and_then(|s| s.parse::<Pid>().ok()) else {
                continue;
            };
            // Processes exit during enumeration; skip them silently
            if let Some(entry) = self.read_entry(pid) {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.pid);
        Ok(entries)
    }

    fn pid_exists(&self, pid: Pid) -> bool {
        if pid == 0 {
            return false;
        }
        match kill(NixPid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn list_threads(&self, pid: Pid) -> PlatformResult<Vec<Tid>> {
        let dir = self.proc_path(pid).join("task");
        let rd = fs::read_dir(&dir).map_err(|e| io_error(pid, "list threads", e))?;
        let mut tids: Vec<Tid> = rd
            .filter_map(|d| d.ok())
            .filter_map(|d| d.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect();
        tids.sort_unstable();
        Ok(tids)
    }

    fn memory_usage(&self, pid: Pid) -> PlatformResult<u64> {
        let statm = fs::read_to_string(self.proc_path(pid).join("statm"))
            .map_err(|e| io_error(pid, "read statm", e))?;
        let resident: u64 = statm
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| PlatformError::Io(format!("malformed statm for {}", pid)))?;
        Ok(resident * self.page_size)
    }

    fn total_cpu_usage(&self) -> PlatformResult<f32> {
        let now = self.cpu_times()?;
        let previous = self.cpu_sample.lock().replace(now);
        let Some(prev) = previous else {
            return Ok(0.0);
        };
        let total = now.total.saturating_sub(prev.total);
        if total == 0 {
            return Ok(0.0);
        }
        let idle = now.idle.saturating_sub(prev.idle);
        Ok(((total - idle.min(total)) as f64 / total as f64 * 100.0) as f32)
    }

    fn memory_status(&self) -> PlatformResult<MemoryStatus> {
        let meminfo = fs::read_to_string(self.proc_root.join("meminfo"))?;
        Ok(parse_meminfo(&meminfo))
    }

    fn foreground_pid(&self) -> PlatformResult<Option<Pid>> {
        // No compositor-independent notion of a foreground window
        Ok(None)
    }

    fn open_process(&self, pid: Pid, _access: AccessMask) -> PlatformResult<RawHandle> {
        // SAFETY: pidfd_open takes only integer arguments
        let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid as libc::pid_t, 0) };
        if fd >= 0 {
            return Ok(RawHandle(fd as i64));
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // Kernels before 5.3: fall back to pid-addressed calls
            Some(libc::ENOSYS) if self.pid_exists(pid) => Ok(RawHandle(-1)),
            _ => Err(map_io_error(pid, "pidfd_open", err)),
        }
    }

    fn close_handle(&self, pid: Pid, raw: RawHandle) -> PlatformResult<()> {
        if raw.0 < 0 {
            return Ok(());
        }
        // SAFETY: the fd came from pidfd_open and is closed exactly once by ProcessHandle::drop
        let rc = unsafe { libc::close(raw.0 as libc::c_int) };
        if rc != 0 {
            return Err(last_error(pid, "close"));
        }
        Ok(())
    }

    fn set_affinity(&self, handle: &ProcessHandle, cores: &CoreSet) -> PlatformResult<()> {
        let pid = handle.pid();
        let mut set = CpuSet::new();
        for core in cores.iter() {
            set.set(core)
                .map_err(|_| PlatformError::InvalidArgument(format!("core {} out of range", core)))?;
        }
        self.for_each_thread(pid, |tid| {
            sched_setaffinity(NixPid::from_raw(tid as i32), &set)
                .map_err(|e| errno_error(pid, "sched_setaffinity", e))
        })
    }

    fn query_affinity(&self, handle: &ProcessHandle) -> PlatformResult<CoreSet> {
        let pid = handle.pid();
        let set = sched_getaffinity(NixPid::from_raw(pid as i32))
            .map_err(|e| errno_error(pid, "sched_getaffinity", e))?;
        Ok((0..self.cores.min(CpuSet::count()))
            .filter(|c| set.is_set(*c).unwrap_or(false))
            .collect())
    }

    fn set_thread_affinity(&self, tid: Tid, cores: &CoreSet) -> PlatformResult<()> {
        let mut set = CpuSet::new();
        for core in cores.iter() {
            set.set(core)
                .map_err(|_| PlatformError::InvalidArgument(format!("core {} out of range", core)))?;
        }
        sched_setaffinity(NixPid::from_raw(tid as i32), &set)
            .map_err(|e| errno_error(tid, "sched_setaffinity", e))
    }

    fn set_priority_class(&self, handle: &ProcessHandle, class: PriorityClass) -> PlatformResult<()> {
        let pid = handle.pid();
        self.for_each_thread(pid, |tid| self.set_thread_nice(pid, tid, class.nice()))
    }

    fn query_priority_class(&self, handle: &ProcessHandle) -> PlatformResult<PriorityClass> {
        let pid = handle.pid();
        Errno::clear();
        // SAFETY: plain syscall wrapper
        let nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
        if nice == -1 && Errno::last() != Errno::UnknownErrno {
            return Err(errno_error(pid, "getpriority", Errno::last()));
        }
        Ok(PriorityClass::from_nice(nice))
    }

    fn set_io_priority(&self, handle: &ProcessHandle, level: IoPriority) -> PlatformResult<()> {
        let pid = handle.pid();
        self.for_each_thread(pid, |tid| self.ioprio_set(pid, tid, level))
    }

    fn set_thread_io_priority(&self, tid: Tid, level: IoPriority) -> PlatformResult<()> {
        self.ioprio_set(tid, tid, level)
    }

    fn set_page_priority(&self, _handle: &ProcessHandle, _level: PagePriority) -> PlatformResult<()> {
        Err(PlatformError::unsupported("page priority"))
    }

    fn set_priority_boost(&self, _handle: &ProcessHandle, disable: bool) -> PlatformResult<()> {
        // CFS has no dynamic boost; leaving it enabled is the only state
        if disable {
            Err(PlatformError::unsupported("priority boost"))
        } else {
            Ok(())
        }
    }

    fn set_eco_qos(&self, handle: &ProcessHandle, enabled: bool) -> PlatformResult<()> {
        let pid = handle.pid();
        let policy = if enabled { libc::SCHED_BATCH } else { libc::SCHED_OTHER };
        self.for_each_thread(pid, |tid| self.set_thread_policy(pid, tid, policy))
    }

    fn trim_working_set(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        let pid = handle.pid();
        if handle.raw().0 < 0 {
            return Err(PlatformError::unsupported("working-set trim without pidfd"));
        }
        let ranges = self.writable_private_ranges(pid)?;
        for chunk in ranges.chunks(MADVISE_BATCH) {
            let iov: Vec<libc::iovec> = chunk
                .iter()
                .map(|(start, len)| libc::iovec {
                    iov_base: *start as *mut libc::c_void,
                    iov_len: *len,
                })
                .collect();
            // SAFETY: iov is a valid array for the duration of the call; the
            // addresses belong to the target process and are only advised, never dereferenced here
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_process_madvise,
                    handle.raw().0 as libc::c_long,
                    iov.as_ptr(),
                    iov.len(),
                    MADV_PAGEOUT,
                    0 as libc::c_long,
                )
            };
            if rc < 0 {
                return Err(last_error(pid, "process_madvise"));
            }
        }
        debug!(pid, ranges = ranges.len(), "working set paged out");
        Ok(())
    }

    fn suspend(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        let pid = handle.pid();
        kill(NixPid::from_raw(pid as i32), Signal::SIGSTOP).map_err(|e| errno_error(pid, "SIGSTOP", e))
    }

    fn resume(&self, handle: &ProcessHandle) -> PlatformResult<()> {
        let pid = handle.pid();
        kill(NixPid::from_raw(pid as i32), Signal::SIGCONT).map_err(|e| errno_error(pid, "SIGCONT", e))
    }

    fn enable_large_pages(&self, _handle: &ProcessHandle) -> PlatformResult<()> {
        Err(PlatformError::unsupported("large pages for another process"))
    }

    fn set_preferred_numa_node(&self, _handle: &ProcessHandle, _node: usize) -> PlatformResult<()> {
        Err(PlatformError::unsupported("preferred NUMA node"))
    }

    fn clear_standby_cache(&self) -> PlatformResult<()> {
        // SAFETY: sync has no preconditions
        unsafe { libc::sync() };
        self.write_control_file(&self.proc_root.join("sys/vm/drop_caches"), "1\n")
    }

    fn set_turbo(&self, enabled: bool) -> PlatformResult<()> {
        let intel = Path::new(TURBO_INTEL_NO_TURBO);
        if intel.exists() {
            return self.write_control_file(intel, if enabled { "0" } else { "1" });
        }
        let boost = Path::new(TURBO_CPUFREQ_BOOST);
        if boost.exists() {
            return self.write_control_file(boost, if enabled { "1" } else { "0" });
        }
        Err(PlatformError::unsupported("turbo control"))
    }

    fn create_job(&self, name: &str) -> PlatformResult<JobHandle> {
        if !Path::new(CGROUP_ROOT).join("cgroup.controllers").exists() {
            return Err(PlatformError::unsupported("cgroups v2"));
        }
        if !self.cgroup_base.exists() {
            fs::create_dir_all(&self.cgroup_base)
                .map_err(|e| PlatformError::Io(format!("create cgroup base: {}", e)))?;
            if let Err(e) = self.write_control_file(&self.cgroup_base.join("cgroup.subtree_control"), "+cpu") {
                warn!(error = %e, "Failed to enable cpu controller for job cgroups");
            }
        }

        let dir = self.cgroup_base.join(sanitize_job_name(name));
        if !dir.exists() {
            fs::create_dir(&dir).map_err(|e| PlatformError::Io(format!("create job cgroup: {}", e)))?;
        }

        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        self.jobs.insert(id, dir);
        Ok(JobHandle {
            id,
            name: name.to_string(),
        })
    }

    fn assign_to_job(&self, job: &JobHandle, handle: &ProcessHandle) -> PlatformResult<()> {
        let dir = self
            .jobs
            .get(&job.id)
            .map(|d| d.value().clone())
            .ok_or_else(|| PlatformError::InvalidArgument(format!("unknown job {}", job.name)))?;
        self.write_control_file(&dir.join("cgroup.procs"), &handle.pid().to_string())
    }

    fn set_job_cpu_rate(&self, job: &JobHandle, percent: u32) -> PlatformResult<()> {
        if percent == 0 || percent > 100 {
            return Err(PlatformError::InvalidArgument(format!(
                "cpu rate {}% out of range",
                percent
            )));
        }
        let dir = self
            .jobs
            .get(&job.id)
            .map(|d| d.value().clone())
            .ok_or_else(|| PlatformError::InvalidArgument(format!("unknown job {}", job.name)))?;
        let quota = CPU_MAX_PERIOD_US * self.cores as u64 * percent as u64 / 100;
        self.write_control_file(
            &dir.join("cpu.max"),
            &format!("{} {}", quota, CPU_MAX_PERIOD_US),
        )
    }

    fn close_job(&self, job: &JobHandle) -> PlatformResult<()> {
        if let Some((_, dir)) = self.jobs.remove(&job.id) {
            // Fails while members are alive; the kernel drops empty cgroups on rmdir later
            if let Err(e) = fs::remove_dir(&dir) {
                debug!(job = %job.name, error = %e, "job cgroup not removed");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// `pid (comm) state ppid pgrp session ...` -> (comm, ppid, session)
fn parse_stat(stat: &str) -> Option<(String, Pid, u32)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let comm = stat.get(open + 1..close)?.to_string();
    let mut fields = stat.get(close + 1..)?.split_whitespace();
    let _state = fields.next()?;
    let ppid = fields.next()?.parse().ok()?;
    let _pgrp = fields.next()?;
    let session = fields.next()?.parse().ok()?;
    Some((comm, ppid, session))
}

fn parse_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find(|l| l.starts_with("Uid:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

fn parse_meminfo(meminfo: &str) -> MemoryStatus {
    let mut status = MemoryStatus::default();
    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else { continue };
        match key {
            "MemTotal:" => status.total_bytes = kb * 1024,
            "MemAvailable:" => status.available_bytes = kb * 1024,
            "Cached:" => status.cached_bytes = kb * 1024,
            _ => {}
        }
    }
    status
}

/// `start-end rw-p ...` lines of private writable anonymous or file mappings
fn parse_private_writable(line: &str) -> Option<(usize, usize)> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?;
    if !perms.contains('w') || !perms.ends_with('p') {
        return None;
    }
    if line.contains("[vsyscall]") || line.contains("[vvar]") {
        return None;
    }
    let (start, end) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    (end > start).then(|| (start, end - start))
}

fn ioprio_value(level: IoPriority) -> u32 {
    let (class, data) = match level {
        IoPriority::VeryLow => (IOPRIO_CLASS_IDLE, 0),
        IoPriority::Low => (IOPRIO_CLASS_BE, 7),
        IoPriority::Normal => (IOPRIO_CLASS_BE, 4),
        IoPriority::High => (IOPRIO_CLASS_BE, 0),
    };
    (class << IOPRIO_CLASS_SHIFT) | data
}

fn sanitize_job_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn last_error(pid: Pid, operation: &str) -> PlatformError {
    map_io_error(pid, operation, io::Error::last_os_error())
}

fn io_error(pid: Pid, operation: &str, err: io::Error) -> PlatformError {
    match err.kind() {
        io::ErrorKind::NotFound => PlatformError::NotFound(pid),
        _ => map_io_error(pid, operation, err),
    }
}

fn map_io_error(pid: Pid, operation: &str, err: io::Error) -> PlatformError {
    match err.raw_os_error() {
        Some(libc::ESRCH) | Some(libc::ENOENT) => PlatformError::NotFound(pid),
        Some(libc::EPERM) | Some(libc::EACCES) => PlatformError::access_denied(pid, operation),
        Some(libc::EBADF) => PlatformError::InvalidHandle(pid),
        Some(libc::ENOSYS) => PlatformError::unsupported(operation),
        _ => PlatformError::Io(format!("{}: {}", operation, err)),
    }
}

fn errno_error(pid: Pid, operation: &str, errno: Errno) -> PlatformError {
    map_io_error(pid, operation, io::Error::from_raw_os_error(errno as i32))
}
