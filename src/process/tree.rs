/*!
 * Process Tree Cache
 * Parent -> children adjacency derived from the latest snapshot
 */

use super::snapshot::ProcessSnapshot;
use crate::core::limits::{MAX_TREE_TRAVERSAL, TREE_REBUILD_INTERVAL};
use crate::core::types::Pid;
use ahash::{AHashSet, RandomState};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TreeState {
    children: HashMap<Pid, Vec<Pid>, RandomState>,
    built_at: Option<Instant>,
    rebuilds: u64,
}

/// Cached process hierarchy
pub struct ProcessTreeCache {
    rebuild_interval: Duration,
    max_traversal: usize,
    state: Mutex<TreeState>,
}

impl ProcessTreeCache {
    pub fn new() -> Self {
        Self::with_interval(TREE_REBUILD_INTERVAL)
    }

    pub fn with_interval(rebuild_interval: Duration) -> Self {
        Self {
            rebuild_interval,
            max_traversal: MAX_TREE_TRAVERSAL,
            state: Mutex::new(TreeState::default()),
        }
    }

    pub fn rebuild_interval(&self) -> Duration {
        self.rebuild_interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.state.lock().built_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.rebuild_interval,
        }
    }

    /// Rebuild adjacency from `snapshot`
    pub fn rebuild(&self, snapshot: &ProcessSnapshot, now: Instant) {
        let mut children: HashMap<Pid, Vec<Pid>, RandomState> = HashMap::with_hasher(RandomState::new());
        for entry in snapshot.iter() {
            // Self-parented and orphaned roots carry no edge
            if entry.ppid == 0 || entry.ppid == entry.pid {
                continue;
            }
            children.entry(entry.ppid).or_default().push(entry.pid);
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut state = self.state.lock();
        state.children = children;
        state.built_at = Some(now);
        state.rebuilds += 1;
        debug!(parents = state.children.len(), "Process tree rebuilt");
    }

    pub fn rebuild_if_due(&self, snapshot: &ProcessSnapshot, now: Instant) -> bool {
        if self.is_due(now) {
            self.rebuild(snapshot, now);
            true
        } else {
            false
        }
    }

    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.state
            .lock()
            .children
            .get(&pid)
            .cloned()
            .unwrap_or_default()
    }

    /// Breadth-first descendants of `pid`, excluding `pid` itself
    ///
    /// A revisited node means the parent links form a cycle; traversal stops
    /// there and returns what was collected.
    pub fn get_all_descendants(&self, pid: Pid) -> Vec<Pid> {
        let state = self.state.lock();
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(pid);
        queue.push_back(pid);

        let mut steps = 0usize;
        while let Some(current) = queue.pop_front() {
            steps += 1;
            if steps > self.max_traversal {
                warn!(pid, collected = result.len(), "Descendant traversal hit its bound");
                break;
            }
            let Some(children) = state.children.get(&current) else {
                continue;
            };
            for &child in children {
                if !visited.insert(child) {
                    debug!(pid, child, "Cycle in parent links, stopping traversal");
                    return result;
                }
                result.push(child);
                queue.push_back(child);
            }
        }
        result
    }

    pub fn rebuilds(&self) -> u64 {
        self.state.lock().rebuilds
    }
}

impl Default for ProcessTreeCache {
    fn default() -> Self {
        Self::new()
    }
}
