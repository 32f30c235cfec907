/*!
 * Manager Statistics
 * Lock-free counters for the optimizer loop
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from the scheduler thread and read from anywhere
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with neighbouring state
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct ManagerStats {
    ticks: AtomicU64,
    applications: AtomicU64,
    cache_skips: AtomicU64,
    filter_skips: AtomicU64,
    knobs_applied: AtomicU64,
    knobs_failed: AtomicU64,
    group_applications: AtomicU64,
    foreground_changes: AtomicU64,
    trims: AtomicU64,
    suspensions: AtomicU64,
    resumes: AtomicU64,
    zombies_cleaned: AtomicU64,
    standby_clears: AtomicU64,
}

/// Point-in-time copy of [`ManagerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatsSnapshot {
    pub ticks: u64,
    pub applications: u64,
    pub cache_skips: u64,
    pub filter_skips: u64,
    pub knobs_applied: u64,
    pub knobs_failed: u64,
    pub group_applications: u64,
    pub foreground_changes: u64,
    pub trims: u64,
    pub suspensions: u64,
    pub resumes: u64,
    pub zombies_cleaned: u64,
    pub standby_clears: u64,
}

macro_rules! counter {
    ($inc:ident, $add:ident, $field:ident) => {
        #[inline]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[inline]
        pub fn $add(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl ManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_tick, add_ticks, ticks);
    counter!(record_application, add_applications, applications);
    counter!(record_cache_skip, add_cache_skips, cache_skips);
    counter!(record_filter_skip, add_filter_skips, filter_skips);
    counter!(record_knob_applied, add_knobs_applied, knobs_applied);
    counter!(record_knob_failed, add_knobs_failed, knobs_failed);
    counter!(record_group_application, add_group_applications, group_applications);
    counter!(record_foreground_change, add_foreground_changes, foreground_changes);
    counter!(record_trim, add_trims, trims);
    counter!(record_suspension, add_suspensions, suspensions);
    counter!(record_resume, add_resumes, resumes);
    counter!(record_zombie_cleaned, add_zombies_cleaned, zombies_cleaned);
    counter!(record_standby_clear, add_standby_clears, standby_clears);

    pub fn snapshot(&self) -> ManagerStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ManagerStatsSnapshot {
            ticks: load(&self.ticks),
            applications: load(&self.applications),
            cache_skips: load(&self.cache_skips),
            filter_skips: load(&self.filter_skips),
            knobs_applied: load(&self.knobs_applied),
            knobs_failed: load(&self.knobs_failed),
            group_applications: load(&self.group_applications),
            foreground_changes: load(&self.foreground_changes),
            trims: load(&self.trims),
            suspensions: load(&self.suspensions),
            resumes: load(&self.resumes),
            zombies_cleaned: load(&self.zombies_cleaned),
            standby_clears: load(&self.standby_clears),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = ManagerStats::new();
        stats.record_tick();
        stats.record_tick();
        stats.add_knobs_applied(7);
        stats.record_knob_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.knobs_applied, 7);
        assert_eq!(snap.knobs_failed, 1);
        assert_eq!(snap.trims, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = ManagerStats::new();
        stats.record_trim();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["trims"], 1);
    }
}
