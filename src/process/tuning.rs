/*!
 * Foreground Tuning
 * One-shot optimizations applied when a process gains the foreground
 *
 * Every tuning is attempted at most once per pid per foreground period and
 * independently of the others. `reset` re-arms them when the pid leaves the
 * foreground.
 */

use super::applicator::set_thread_io_priorities;
use super::handle_cache::HandleCache;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::limits::{
    LARGE_PAGE_MIN_RSS_BYTES, LATENCY_SENSITIVE_MAX_THREADS, SINGLE_THREAD_MAX_THREADS,
};
use crate::core::types::{AccessMask, IoPriority, Pid};
use crate::platform::ProcessPlatform;
use crate::topology::HardwareTopology;
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-count based workload class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    SingleThread,
    LatencySensitive,
    Throughput,
}

impl Workload {
    pub fn classify(threads: usize) -> Self {
        if threads <= SINGLE_THREAD_MAX_THREADS {
            Workload::SingleThread
        } else if threads <= LATENCY_SENSITIVE_MAX_THREADS {
            Workload::LatencySensitive
        } else {
            Workload::Throughput
        }
    }

    pub fn is_latency_sensitive(self) -> bool {
        !matches!(self, Workload::Throughput)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tuning {
    ThreadPinning,
    ThreadIo,
    Turbo,
    LargePages,
    NumaPlacement,
}

impl Tuning {
    pub const ALL: [Tuning; 5] = [
        Tuning::ThreadPinning,
        Tuning::ThreadIo,
        Tuning::Turbo,
        Tuning::LargePages,
        Tuning::NumaPlacement,
    ];
}

/// What one `tune` call did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub workload: Option<Workload>,
    pub applied: Vec<Tuning>,
    /// Not applicable to this process or host
    pub skipped: Vec<Tuning>,
    pub failed: Vec<(Tuning, PlatformError)>,
}

enum Outcome {
    Applied,
    Skipped,
}

/// Foreground one-shot tuner
pub struct ForegroundTuner {
    platform: Arc<dyn ProcessPlatform>,
    handles: Arc<HandleCache>,
    topology: Arc<HardwareTopology>,
    large_page_min_rss: u64,
    done: Mutex<HashMap<Pid, BTreeSet<Tuning>, RandomState>>,
    turbo_enabled: AtomicBool,
}

impl ForegroundTuner {
    pub fn new(
        platform: Arc<dyn ProcessPlatform>,
        handles: Arc<HandleCache>,
        topology: Arc<HardwareTopology>,
    ) -> Self {
        Self {
            platform,
            handles,
            topology,
            large_page_min_rss: LARGE_PAGE_MIN_RSS_BYTES,
            done: Mutex::new(HashMap::with_hasher(RandomState::new())),
            turbo_enabled: AtomicBool::new(false),
        }
    }

    /// Run every tuning not yet attempted for `pid` in this foreground period
    pub fn tune(&self, pid: Pid, io_priority: IoPriority) -> TuningReport {
        let pending: Vec<Tuning> = {
            let mut done = self.done.lock();
            let attempted = done.entry(pid).or_default();
            let pending = Tuning::ALL
                .into_iter()
                .filter(|t| !attempted.contains(t))
                .collect();
            attempted.extend(Tuning::ALL);
            pending
        };

        let mut report = TuningReport::default();
        if pending.is_empty() {
            return report;
        }

        report.workload = match self.platform.thread_count(pid) {
            Ok(threads) => Some(Workload::classify(threads)),
            Err(e) => {
                debug!(pid, error = %e, "Thread count unavailable");
                None
            }
        };

        for tuning in pending {
            let result = match tuning {
                Tuning::ThreadPinning => self.pin_threads(pid, report.workload),
                Tuning::ThreadIo => {
                    set_thread_io_priorities(self.platform.as_ref(), pid, io_priority).map(|()| Outcome::Applied)
                }
                Tuning::Turbo => self.enable_turbo(),
                Tuning::LargePages => self.large_pages(pid),
                Tuning::NumaPlacement => self.numa_placement(pid),
            };
            match result {
                Ok(Outcome::Applied) => report.applied.push(tuning),
                Ok(Outcome::Skipped) | Err(PlatformError::Unsupported(_)) => report.skipped.push(tuning),
                Err(e) => {
                    debug!(pid, ?tuning, error = %e, "Foreground tuning failed");
                    report.failed.push((tuning, e));
                }
            }
        }
        report
    }

    /// Re-arm tunings for a pid leaving the foreground
    pub fn reset(&self, pid: Pid) {
        self.done.lock().remove(&pid);
    }

    pub fn is_tuned(&self, pid: Pid) -> bool {
        self.done.lock().contains_key(&pid)
    }

    /// Drop state for dead pids
    pub fn retain<F: Fn(Pid) -> bool>(&self, alive: F) -> usize {
        let mut done = self.done.lock();
        let before = done.len();
        done.retain(|pid, _| alive(*pid));
        before - done.len()
    }

    fn pin_threads(&self, pid: Pid, workload: Option<Workload>) -> PlatformResult<Outcome> {
        let Some(workload) = workload.filter(|w| w.is_latency_sensitive()) else {
            return Ok(Outcome::Skipped);
        };
        let cores = self.topology.performance_or_all();
        let threads = self.platform.list_threads(pid)?;
        for tid in threads {
            match self.platform.set_thread_affinity(tid, &cores) {
                Ok(()) | Err(PlatformError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(pid, ?workload, cores = %cores, "Threads pinned");
        Ok(Outcome::Applied)
    }

    fn enable_turbo(&self) -> PlatformResult<Outcome> {
        if self.turbo_enabled.load(Ordering::Acquire) {
            return Ok(Outcome::Skipped);
        }
        self.platform.set_turbo(true)?;
        self.turbo_enabled.store(true, Ordering::Release);
        info!("Turbo frequencies enabled");
        Ok(Outcome::Applied)
    }

    fn large_pages(&self, pid: Pid) -> PlatformResult<Outcome> {
        if self.platform.memory_usage(pid)? < self.large_page_min_rss {
            return Ok(Outcome::Skipped);
        }
        let handle = self
            .handles
            .get_handle(pid, AccessMask::TUNE | AccessMask::VM_OPERATION)
            .ok_or(PlatformError::InvalidHandle(pid))?;
        self.platform.enable_large_pages(&handle)?;
        Ok(Outcome::Applied)
    }

    fn numa_placement(&self, pid: Pid) -> PlatformResult<Outcome> {
        let Some(node) = self
            .topology
            .preferred_numa_node(&self.topology.foreground_cores())
        else {
            return Ok(Outcome::Skipped);
        };
        let handle = self
            .handles
            .get_handle(pid, AccessMask::TUNE)
            .ok_or(PlatformError::InvalidHandle(pid))?;
        self.platform.set_preferred_numa_node(&handle, node)?;
        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CoreSet;
    use crate::platform::{PlatformCall, ProcessEntry, SimulationPlatform};

    const MB: u64 = 1024 * 1024;

    fn setup(topology: HardwareTopology) -> (Arc<SimulationPlatform>, ForegroundTuner) {
        let sim = Arc::new(SimulationPlatform::new());
        let handles = Arc::new(HandleCache::new(sim.clone()));
        let tuner = ForegroundTuner::new(sim.clone(), handles, Arc::new(topology));
        (sim, tuner)
    }

    #[test]
    fn test_classify_workload() {
        assert_eq!(Workload::classify(1), Workload::SingleThread);
        assert_eq!(Workload::classify(2), Workload::SingleThread);
        assert_eq!(Workload::classify(8), Workload::LatencySensitive);
        assert_eq!(Workload::classify(9), Workload::Throughput);
    }

    #[test]
    fn test_latency_sensitive_pinned_to_performance_cores() {
        let (sim, tuner) = setup(HardwareTopology::hybrid(4, 4));
        sim.spawn_with(ProcessEntry::new(10, 1, "game"), 4, 300 * MB);

        let report = tuner.tune(10, IoPriority::High);
        assert_eq!(report.workload, Some(Workload::LatencySensitive));
        assert!(report.applied.contains(&Tuning::ThreadPinning));
        assert!(report.applied.contains(&Tuning::LargePages));
        assert!(report.skipped.contains(&Tuning::NumaPlacement));

        let pinned: Vec<CoreSet> = sim
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::SetThreadAffinity { cores, .. } => Some(cores),
                _ => None,
            })
            .collect();
        assert_eq!(pinned.len(), 4);
        assert!(pinned.iter().all(|c| *c == CoreSet::new(0..4)));
    }

    #[test]
    fn test_once_per_foreground_period() {
        let (sim, tuner) = setup(HardwareTopology::uniform(8));
        sim.spawn(ProcessEntry::new(10, 1, "app"));

        assert!(!tuner.tune(10, IoPriority::Normal).applied.is_empty());
        sim.clear_calls();
        assert_eq!(tuner.tune(10, IoPriority::Normal), TuningReport::default());
        assert!(sim.actuation_calls().is_empty());

        tuner.reset(10);
        let report = tuner.tune(10, IoPriority::Normal);
        assert!(report.applied.contains(&Tuning::ThreadIo));
        // Turbo is system-wide and stays on
        assert!(report.skipped.contains(&Tuning::Turbo));
    }

    #[test]
    fn test_failure_isolated() {
        let (sim, tuner) = setup(
            HardwareTopology::uniform(8).with_numa_nodes(vec![CoreSet::new(0..4), CoreSet::new(4..8)]),
        );
        sim.spawn_with(ProcessEntry::new(10, 1, "app"), 16, 512 * MB);
        sim.fail(10, "enable_large_pages", PlatformError::access_denied(10, "large pages"));

        let report = tuner.tune(10, IoPriority::Normal);
        assert_eq!(report.workload, Some(Workload::Throughput));
        assert!(report.skipped.contains(&Tuning::ThreadPinning));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Tuning::LargePages);
        assert!(report.applied.contains(&Tuning::NumaPlacement));
        assert!(report.applied.contains(&Tuning::Turbo));
    }
}
