/*!
 * Maintenance
 * Scheduler tick, coalesced task bodies and shutdown
 */

use super::tasks::MaintenanceTask;
use super::unified::{ApplyOutcome, UnifiedProcessManager};
use crate::config::Module;
use crate::core::errors::PlatformError;
use crate::core::limits::MIN_WAKE;
use crate::core::types::{Pid, Role};
use crate::monitoring::OperationSpan;
use ahash::RandomState;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

impl UnifiedProcessManager {
    /// One scheduler iteration; returns how long to sleep
    pub fn tick(&self, now: Instant) -> Duration {
        let span = OperationSpan::new("scheduler_tick");
        let _guard = span.enter();
        self.stats.record_tick();

        self.debouncer.fire_due_with(now, |pid| {
            if let Err(e) = self.apply_foreground_change(pid, now) {
                warn!(pid, error = %e, "Foreground change not applied");
            }
        });

        let due = self.coalescer.lock().tasks_due(now);
        for task in &due {
            let Some(kind) = MaintenanceTask::from_name(&task.name) else {
                continue;
            };
            let started = Instant::now();
            self.run_task(kind, now);
            self.coalescer.lock().mark_executed(&task.name, started.elapsed(), now);
            trace!(task = %kind, urgency = task.urgency, overdue = task.overdue, "Task executed");
        }

        span.record_items_processed(due.len());
        self.next_wake(now)
    }

    /// Sleep until the next task or pending foreground commit, whichever is first
    pub fn next_wake(&self, now: Instant) -> Duration {
        let wake = self.coalescer.lock().next_wake(now);
        match self.debouncer.next_deadline() {
            Some(deadline) => wake.min(deadline.saturating_duration_since(now).max(MIN_WAKE)),
            None => wake,
        }
    }

    pub fn run_task(&self, task: MaintenanceTask, now: Instant) {
        match task {
            MaintenanceTask::AllowlistReload => {
                self.reload_allowlist();
            }
            MaintenanceTask::SnapshotRefresh => {
                self.snapshots.force_refresh(now);
                self.update_all_processes(now);
            }
            MaintenanceTask::ZombieCleanup => {
                self.cleanup_zombies(now);
            }
            MaintenanceTask::ForegroundCheck => self.poll_foreground(now),
            MaintenanceTask::TreeRebuild => {
                let snapshot = self.snapshots.get_snapshot(now);
                self.tree.rebuild(&snapshot, now);
            }
            MaintenanceTask::HandleCacheCleanup => {
                self.handles.cleanup_stale_handles(now);
            }
            MaintenanceTask::TuningCleanup => {
                let snapshot = self.snapshots.get_snapshot(now);
                self.tuner.retain(|pid| snapshot.contains(pid));
            }
            MaintenanceTask::DecisionCacheCleanup => {
                self.decisions.cleanup_expired(now);
            }
            MaintenanceTask::SuspensionCheck => {
                self.check_suspensions(now);
            }
        }
    }

    /// Differential pass over every process in the snapshot
    ///
    /// The current foreground group keeps foreground settings; everything
    /// else is treated as background.
    pub fn update_all_processes(&self, now: Instant) -> usize {
        if !self.modules.is_enabled(Module::Settings) {
            return 0;
        }
        let snapshot = self.snapshots.get_snapshot(now);
        self.tree.rebuild_if_due(&snapshot, now);

        let mut foreground: HashSet<Pid, RandomState> = HashSet::with_hasher(RandomState::new());
        if let Some(fg) = self.current_foreground().filter(|pid| snapshot.contains(*pid)) {
            if self.modules.is_enabled(Module::Groups) {
                foreground.extend(self.group_members(fg, &snapshot));
            } else {
                foreground.insert(fg);
            }
        }

        let mut applied = 0;
        for pid in snapshot.pids() {
            if pid == 0 || self.filter.is_skipped(pid, &snapshot) {
                continue;
            }
            match self.apply_all_settings(pid, foreground.contains(&pid), now) {
                Ok(ApplyOutcome::Applied { report }) if !report.applied.is_empty() => applied += 1,
                Ok(_) => {}
                Err(e) => debug!(pid, error = %e, "Process not updated"),
            }
        }
        if applied > 0 {
            debug!(applied, total = snapshot.len(), "Differential pass complete");
        }
        applied
    }

    /// Drop all per-pid state for processes that are gone
    pub fn cleanup_zombies(&self, now: Instant) -> usize {
        let snapshot = self.snapshots.get_snapshot(now);
        // An empty snapshot means enumeration failed, not that everything died
        if snapshot.is_empty() {
            return 0;
        }
        let alive = |pid: Pid| snapshot.contains(pid);

        let mut dead: HashSet<Pid, RandomState> = HashSet::with_hasher(RandomState::new());
        {
            let mut states = self.process_states.lock();
            dead.extend(states.keys().copied().filter(|pid| !alive(*pid)));
            states.retain(|pid, _| alive(*pid));
        }
        {
            let mut applied = self.applied.lock();
            dead.extend(applied.keys().copied().filter(|pid| !alive(*pid)));
            applied.retain(|pid, _| alive(*pid));
        }
        self.minimized.lock().retain(|pid, _| alive(*pid));

        for &pid in &dead {
            self.decisions.invalidate(pid);
            self.handles.invalidate(pid);
        }
        self.jobs.retain(alive);
        self.suspension.retain(alive);
        self.trimmer.retain(alive);
        self.tuner.retain(alive);

        {
            let mut foreground = self.foreground.lock();
            if foreground.is_some_and(|pid| !alive(pid)) {
                *foreground = None;
            }
        }

        if !dead.is_empty() {
            self.stats.add_zombies_cleaned(dead.len() as u64);
            debug!(cleaned = dead.len(), "Dead processes forgotten");
        }
        dead.len()
    }

    fn poll_foreground(&self, now: Instant) {
        match self.platform.foreground_pid() {
            Ok(Some(pid)) if pid != 0 => self.debouncer.request_foreground_change(pid, now),
            Ok(_) | Err(PlatformError::Unsupported(_)) => {}
            Err(e) => debug!(error = %e, "Foreground query failed"),
        }
    }

    /// Re-read the allow-list file when it changed on disk
    pub fn reload_allowlist(&self) -> bool {
        let Some(file) = &self.allowlist else {
            return false;
        };
        match file.reload_if_changed() {
            Ok(Some(names)) => {
                let count = names.len();
                self.filter.set_allow_names(names);
                info!(path = %file.path().display(), entries = count, "Allow-list reloaded");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "Allow-list reload failed");
                false
            }
        }
    }

    /// Suspend background processes idle past the inactivity threshold
    pub fn check_suspensions(&self, now: Instant) -> usize {
        if !self.modules.is_enabled(Module::Suspension) {
            return 0;
        }
        let foreground = self.current_foreground();
        let candidates: Vec<Pid> = self
            .process_states
            .lock()
            .iter()
            .filter(|(pid, state)| {
                state.role == Role::Background
                    && Some(**pid) != foreground
                    && self.suspension.should_suspend(state.background_since, now)
            })
            .map(|(pid, _)| *pid)
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let snapshot = self.snapshots.get_snapshot(now);
        let mut suspended = 0;
        for pid in candidates {
            if self.suspension.is_suspended(pid) || self.filter.is_skipped(pid, &snapshot) {
                continue;
            }
            match self.suspension.suspend(pid, now) {
                Ok(true) => {
                    self.stats.record_suspension();
                    suspended += 1;
                }
                Ok(false) => {}
                Err(e) => debug!(pid, error = %e, "Suspend failed"),
            }
        }
        if suspended > 0 {
            info!(suspended, "Inactive background processes suspended");
        }
        suspended
    }

    /// Drop the standby cache when memory is tight and the cooldown allows it
    pub fn standby_maintenance(&self, now: Instant) -> bool {
        if !self.modules.is_enabled(Module::Memory) {
            return false;
        }
        let maintenance = &self.config.maintenance;
        let cooldown = Duration::from_secs(maintenance.standby_cooldown_secs);
        if let Some(at) = *self.last_standby_clear.lock() {
            if now.saturating_duration_since(at) < cooldown {
                return false;
            }
        }

        let status = match self.platform.memory_status() {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "Memory status unavailable");
                return false;
            }
        };
        if status.usage_percent() < maintenance.ram_usage_percent
            || status.cached_percent() < maintenance.cached_percent
        {
            return false;
        }

        match self.platform.clear_standby_cache() {
            Ok(()) => {
                *self.last_standby_clear.lock() = Some(now);
                self.stats.record_standby_clear();
                info!(
                    usage_percent = status.usage_percent(),
                    cached_percent = status.cached_percent(),
                    "Standby cache cleared"
                );
                true
            }
            Err(e) => {
                debug!(error = %e, "Standby cache not cleared");
                false
            }
        }
    }

    /// Release everything the optimizer holds on the system
    pub fn shutdown(&self) {
        let resumed = self.suspension.resume_all();
        self.stats.add_resumes(resumed as u64);
        self.jobs.close_all();
        let closed = self.handles.close_all();
        info!(resumed, closed_handles = closed, "Optimizer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::core::types::PriorityClass;
    use crate::platform::{MemoryStatus, PlatformCall, ProcessEntry, SimulationPlatform};
    use crate::topology::HardwareTopology;
    use std::sync::Arc;

    fn setup(config: OptimizerConfig) -> (Arc<SimulationPlatform>, UnifiedProcessManager) {
        let sim = Arc::new(SimulationPlatform::new());
        sim.spawn(ProcessEntry::new(10, 1, "browser.exe").with_user("alice"));
        sim.spawn(ProcessEntry::new(11, 1, "mail.exe").with_user("alice"));
        let manager = UnifiedProcessManager::builder()
            .with_config(config)
            .with_platform(sim.clone())
            .with_topology(HardwareTopology::uniform(8))
            .build()
            .unwrap();
        (sim, manager)
    }

    #[test]
    fn test_tick_commits_debounced_foreground() {
        let (sim, manager) = setup(OptimizerConfig::default());
        let t0 = Instant::now();
        manager.request_foreground_change(10, t0).unwrap();

        let wake = manager.tick(t0 + Duration::from_millis(100));
        assert!(wake <= Duration::from_millis(200));
        assert_eq!(manager.current_foreground(), None);

        manager.tick(t0 + Duration::from_millis(301));
        assert_eq!(manager.current_foreground(), Some(10));
        assert!(sim.process(10).unwrap().priority >= PriorityClass::AboveNormal);
    }

    #[test]
    fn test_snapshot_refresh_runs_full_pass() {
        let (sim, manager) = setup(OptimizerConfig::default());
        let t0 = Instant::now();
        manager.apply_foreground_change(10, t0).unwrap();

        manager.run_task(MaintenanceTask::SnapshotRefresh, t0 + Duration::from_secs(1));
        assert_eq!(sim.process(11).unwrap().priority, PriorityClass::Idle);
        assert!(sim.process(10).unwrap().priority >= PriorityClass::AboveNormal);
    }

    #[test]
    fn test_zombie_cleanup_forgets_dead() {
        let (sim, manager) = setup(OptimizerConfig::default());
        let t0 = Instant::now();
        manager.apply_all_settings(11, false, t0).unwrap();
        manager.record_minimized(11, t0);
        sim.kill(11);

        let cleaned = manager.cleanup_zombies(t0 + Duration::from_secs(1));
        assert_eq!(cleaned, 1);
        assert!(manager.applied_state(11).is_none());
        assert_eq!(manager.minimized_for(11, t0), None);
        assert_eq!(manager.tracked_processes(), 0);
        assert_eq!(manager.stats().zombies_cleaned, 1);
    }

    #[test]
    fn test_suspension_check_respects_module_and_threshold() {
        let mut config = OptimizerConfig::default();
        config.suspension.inactivity_threshold_secs = 60;
        let (sim, manager) = setup(config);
        let t0 = Instant::now();
        manager.apply_all_settings(11, false, t0).unwrap();

        let late = t0 + Duration::from_secs(61);
        assert_eq!(manager.check_suspensions(late), 0);

        manager.toggle_module("suspension", true).unwrap();
        assert_eq!(manager.check_suspensions(t0 + Duration::from_secs(30)), 0);
        assert_eq!(manager.check_suspensions(late), 1);
        assert!(sim.is_suspended(11));
        assert_eq!(manager.check_suspensions(late), 0);
    }

    #[test]
    fn test_standby_maintenance_thresholds_and_cooldown() {
        let (sim, manager) = setup(OptimizerConfig::default());
        let t0 = Instant::now();
        let gib = 1024 * 1024 * 1024;

        sim.set_memory_status(MemoryStatus {
            total_bytes: 16 * gib,
            available_bytes: 8 * gib,
            cached_bytes: 8 * gib,
        });
        assert!(!manager.standby_maintenance(t0));

        sim.set_memory_status(MemoryStatus {
            total_bytes: 16 * gib,
            available_bytes: 2 * gib,
            cached_bytes: 8 * gib,
        });
        assert!(manager.standby_maintenance(t0));
        assert!(!manager.standby_maintenance(t0 + Duration::from_secs(60)));
        assert!(manager.standby_maintenance(t0 + Duration::from_secs(3_601)));
        assert_eq!(manager.stats().standby_clears, 2);
    }

    #[test]
    fn test_shutdown_resumes_and_closes() {
        let (sim, manager) = setup(OptimizerConfig::default());
        manager.suspension().suspend(11, Instant::now()).unwrap();
        manager.apply_all_settings(10, false, Instant::now()).unwrap();

        manager.shutdown();
        assert!(!sim.is_suspended(11));
        assert_eq!(sim.open_handle_count(), 0);
        assert!(sim.calls().contains(&PlatformCall::Resume { pid: 11 }));
    }

    #[test]
    fn test_poll_foreground_feeds_debouncer() {
        let (sim, manager) = setup(OptimizerConfig::default());
        sim.set_foreground(Some(11));
        let t0 = Instant::now();
        manager.run_task(MaintenanceTask::ForegroundCheck, t0);
        assert!(manager.debouncer().next_deadline().is_some());
    }
}
