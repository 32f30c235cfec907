/*!
 * Maintenance Tasks
 * Named periodic work registered on the timer coalescer
 */

use crate::config::OptimizerConfig;
use crate::scheduler::TaskSpec;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    AllowlistReload,
    SnapshotRefresh,
    ZombieCleanup,
    ForegroundCheck,
    TreeRebuild,
    HandleCacheCleanup,
    TuningCleanup,
    DecisionCacheCleanup,
    SuspensionCheck,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 9] = [
        MaintenanceTask::AllowlistReload,
        MaintenanceTask::SnapshotRefresh,
        MaintenanceTask::ZombieCleanup,
        MaintenanceTask::ForegroundCheck,
        MaintenanceTask::TreeRebuild,
        MaintenanceTask::HandleCacheCleanup,
        MaintenanceTask::TuningCleanup,
        MaintenanceTask::DecisionCacheCleanup,
        MaintenanceTask::SuspensionCheck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaintenanceTask::AllowlistReload => "allowlist_reload",
            MaintenanceTask::SnapshotRefresh => "snapshot_refresh",
            MaintenanceTask::ZombieCleanup => "zombie_cleanup",
            MaintenanceTask::ForegroundCheck => "foreground_check",
            MaintenanceTask::TreeRebuild => "tree_rebuild",
            MaintenanceTask::HandleCacheCleanup => "handle_cache_cleanup",
            MaintenanceTask::TuningCleanup => "tuning_cleanup",
            MaintenanceTask::DecisionCacheCleanup => "decision_cache_cleanup",
            MaintenanceTask::SuspensionCheck => "suspension_check",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|task| task.name() == name)
    }

    /// Registration parameters taken from configuration
    pub fn spec(self, config: &OptimizerConfig) -> TaskSpec {
        let scheduler = &config.scheduler;
        match self {
            MaintenanceTask::AllowlistReload => scheduler.allowlist_reload.spec(self.name()),
            MaintenanceTask::SnapshotRefresh => scheduler.snapshot_refresh.spec(self.name()),
            MaintenanceTask::ZombieCleanup => scheduler.zombie_cleanup.spec(self.name()),
            MaintenanceTask::ForegroundCheck => TaskSpec::new(
                self.name(),
                Duration::from_millis(config.foreground.poll_interval_ms),
                scheduler.foreground_check_priority,
            ),
            // Tree rebuild runs at a fixed cadence
            MaintenanceTask::TreeRebuild => TaskSpec::new(
                self.name(),
                Duration::from_millis(config.snapshot.tree_rebuild_ms),
                scheduler.tree_rebuild_priority,
            )
            .fixed(),
            MaintenanceTask::HandleCacheCleanup => scheduler.handle_cache_cleanup.spec(self.name()),
            MaintenanceTask::TuningCleanup => scheduler.tuning_cleanup.spec(self.name()),
            MaintenanceTask::DecisionCacheCleanup => scheduler.decision_cache_cleanup.spec(self.name()),
            MaintenanceTask::SuspensionCheck => scheduler.suspension_check.spec(self.name()),
        }
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for task in MaintenanceTask::ALL {
            assert_eq!(MaintenanceTask::from_name(task.name()), Some(task));
        }
        assert_eq!(MaintenanceTask::from_name("defrag"), None);
    }

    #[test]
    fn test_specs_follow_config() {
        let mut config = OptimizerConfig::default();
        config.foreground.poll_interval_ms = 250;
        config.snapshot.tree_rebuild_ms = 4_000;

        let fg = MaintenanceTask::ForegroundCheck.spec(&config);
        assert_eq!(fg.interval, Duration::from_millis(250));
        assert!(fg.adaptive);

        let tree = MaintenanceTask::TreeRebuild.spec(&config);
        assert_eq!(tree.interval, Duration::from_millis(4_000));
        assert!(!tree.adaptive);

        let zombies = MaintenanceTask::ZombieCleanup.spec(&config);
        assert_eq!(zombies.name, "zombie_cleanup");
        assert_eq!(zombies.interval, Duration::from_millis(5_000));
    }
}
