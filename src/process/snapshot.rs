/*!
 * Process Snapshot Engine
 * TTL-bounded enumeration of running processes
 *
 * Snapshots are published through an `ArcSwapOption`; readers inside the
 * TTL window receive the very same `Arc` without touching the OS.
 */

use crate::core::limits::SNAPSHOT_TTL;
use crate::core::types::{Pid, ProcessName};
use crate::platform::{ProcessEntry, ProcessPlatform};
use ahash::RandomState;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Immutable view of all processes at one instant
#[derive(Debug)]
pub struct ProcessSnapshot {
    taken_at: Instant,
    processes: HashMap<Pid, ProcessEntry, RandomState>,
    by_name: HashMap<ProcessName, Vec<Pid>, RandomState>,
}

impl ProcessSnapshot {
    pub fn from_entries(entries: Vec<ProcessEntry>, taken_at: Instant) -> Self {
        let mut processes = HashMap::with_capacity_and_hasher(entries.len(), RandomState::new());
        let mut by_name: HashMap<ProcessName, Vec<Pid>, RandomState> =
            HashMap::with_hasher(RandomState::new());

        for entry in entries {
            by_name.entry(entry.name.clone()).or_default().push(entry.pid);
            processes.insert(entry.pid, entry);
        }
        for pids in by_name.values_mut() {
            pids.sort_unstable();
        }

        Self {
            taken_at,
            processes,
            by_name,
        }
    }

    pub fn empty(taken_at: Instant) -> Self {
        Self::from_entries(Vec::new(), taken_at)
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessEntry> {
        self.processes.get(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Pids sharing a lowercase executable name
    pub fn pids_by_name(&self, name: &str) -> &[Pid] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.processes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Cached process enumeration
pub struct ProcessSnapshotEngine {
    platform: Arc<dyn ProcessPlatform>,
    ttl: Duration,
    current: ArcSwapOption<ProcessSnapshot>,
    refresh: Mutex<()>,
    enumerations: AtomicU64,
}

impl ProcessSnapshotEngine {
    pub fn new(platform: Arc<dyn ProcessPlatform>) -> Self {
        Self::with_ttl(platform, SNAPSHOT_TTL)
    }

    pub fn with_ttl(platform: Arc<dyn ProcessPlatform>, ttl: Duration) -> Self {
        Self {
            platform,
            ttl,
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            enumerations: AtomicU64::new(0),
        }
    }

    /// Latest snapshot, re-enumerating only when older than the TTL
    pub fn get_snapshot(&self, now: Instant) -> Arc<ProcessSnapshot> {
        if let Some(snapshot) = self.fresh(now) {
            return snapshot;
        }

        let _guard = self.refresh.lock();
        // Another caller may have refreshed while we waited
        if let Some(snapshot) = self.fresh(now) {
            return snapshot;
        }
        self.enumerate(now)
    }

    /// Enumerate regardless of age
    pub fn force_refresh(&self, now: Instant) -> Arc<ProcessSnapshot> {
        let _guard = self.refresh.lock();
        self.enumerate(now)
    }

    /// Last published snapshot without refreshing
    pub fn latest(&self) -> Option<Arc<ProcessSnapshot>> {
        self.current.load_full()
    }

    /// Number of OS enumerations performed
    pub fn enumerations(&self) -> u64 {
        self.enumerations.load(Ordering::Relaxed)
    }

    fn fresh(&self, now: Instant) -> Option<Arc<ProcessSnapshot>> {
        self.current
            .load_full()
            .filter(|s| now.saturating_duration_since(s.taken_at) < self.ttl)
    }

    fn enumerate(&self, now: Instant) -> Arc<ProcessSnapshot> {
        self.enumerations.fetch_add(1, Ordering::Relaxed);
        match self.platform.enumerate_processes() {
            Ok(entries) => {
                let snapshot = Arc::new(ProcessSnapshot::from_entries(entries, now));
                self.current.store(Some(Arc::clone(&snapshot)));
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Process enumeration failed, keeping previous snapshot");
                self.latest()
                    .unwrap_or_else(|| Arc::new(ProcessSnapshot::empty(now)))
            }
        }
    }
}
