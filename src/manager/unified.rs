/*!
 * Unified Process Manager
 * Owns every optimizer component and runs the per-pid settings pipeline
 *
 * Per-pid pipeline:
 * filter -> resume (foreground) -> decision cache -> desired state ->
 * diff against applied state -> apply -> record successes -> validate ->
 * foreground tuning
 */

use super::builder::ManagerBuilder;
use crate::config::{Module, ModulesConfig, OptimizerConfig};
use crate::core::errors::{ensure_valid_pid, OptimizerError, Result};
use crate::core::types::{IoPriority, Pid, Role};
use crate::monitoring::{ManagerStats, ManagerStatsSnapshot};
use crate::platform::ProcessPlatform;
use crate::process::{
    AllowListFile, ApplyReport, AppliedState, DecisionCache, DecisionKind, DesiredState,
    ForegroundDebouncer, ForegroundTuner, HandleCache, IntegrityValidator, JobTable, Knob, KnobValue,
    ProcessFilter, ProcessSnapshotEngine, ProcessTreeCache, ProfileDetector, ProfileSettings,
    SettingsApplicator, SettingsBatch, SkipReason, SuspensionManager, WorkingSetTrimmer,
};
use crate::scheduler::TimerCoalescer;
use crate::topology::HardwareTopology;
use ahash::RandomState;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Result of running the pipeline for one pid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Left alone by the allow/deny filter
    Skipped { reason: SkipReason },
    /// The settings module is switched off
    Disabled,
    /// Same decision already applied within its TTL
    Cached { trimmed: bool },
    Applied { report: ApplyReport },
}

impl ApplyOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ApplyOutcome::Skipped { .. })
    }

    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            ApplyOutcome::Applied { report } => Some(report),
            _ => None,
        }
    }
}

/// Role history of a tracked pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProcessState {
    pub(crate) role: Role,
    /// Start of the current continuous background period
    pub(crate) background_since: Option<Instant>,
}

impl ProcessState {
    fn new(role: Role, now: Instant) -> Self {
        Self {
            role,
            background_since: (!role.is_foreground()).then_some(now),
        }
    }

    fn observe(&mut self, role: Role, now: Instant) {
        if role == self.role {
            return;
        }
        self.role = role;
        self.background_since = (!role.is_foreground()).then_some(now);
    }
}

/// Runtime module switches
pub(crate) struct ModuleFlags([AtomicBool; 7]);

impl ModuleFlags {
    pub(crate) fn from_config(config: &ModulesConfig) -> Self {
        Self(Module::ALL.map(|m| AtomicBool::new(config.is_enabled(m))))
    }

    #[inline]
    pub(crate) fn is_enabled(&self, module: Module) -> bool {
        self.0[module.index()].load(Ordering::Acquire)
    }

    fn set(&self, module: Module, enabled: bool) -> bool {
        self.0[module.index()].swap(enabled, Ordering::AcqRel)
    }
}

pub(crate) type PidMap<V> = HashMap<Pid, V, RandomState>;

/// Orchestrator for the whole optimizer
///
/// Everything runs on the caller's thread; the runtime drives `tick` from a
/// single scheduler thread so per-pid diff/apply never interleaves.
pub struct UnifiedProcessManager {
    pub(crate) config: OptimizerConfig,
    pub(crate) platform: Arc<dyn ProcessPlatform>,
    pub(crate) topology: Arc<HardwareTopology>,
    pub(crate) handles: Arc<HandleCache>,
    pub(crate) snapshots: ProcessSnapshotEngine,
    pub(crate) tree: ProcessTreeCache,
    pub(crate) debouncer: ForegroundDebouncer,
    pub(crate) decisions: DecisionCache,
    pub(crate) applicator: SettingsApplicator,
    pub(crate) trimmer: WorkingSetTrimmer,
    pub(crate) suspension: SuspensionManager,
    pub(crate) jobs: JobTable,
    pub(crate) filter: ProcessFilter,
    pub(crate) allowlist: Option<AllowListFile>,
    pub(crate) profiles: ProfileDetector,
    pub(crate) validator: IntegrityValidator,
    pub(crate) tuner: ForegroundTuner,
    pub(crate) coalescer: Mutex<TimerCoalescer>,
    pub(crate) process_states: Mutex<PidMap<ProcessState>>,
    pub(crate) applied: Mutex<PidMap<AppliedState>>,
    pub(crate) minimized: Mutex<PidMap<Instant>>,
    pub(crate) foreground: Mutex<Option<Pid>>,
    pub(crate) last_standby_clear: Mutex<Option<Instant>>,
    pub(crate) modules: ModuleFlags,
    pub(crate) events_tx: flume::Sender<Pid>,
    pub(crate) events_rx: flume::Receiver<Pid>,
    pub(crate) stats: ManagerStats,
}

impl UnifiedProcessManager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    // ---------------------------------------------------------------------
    // Per-pid pipeline
    // ---------------------------------------------------------------------

    /// Bring one process to the state its role calls for
    ///
    /// Only pid 0 is an error; every OS failure is folded into the report.
    pub fn apply_all_settings(&self, pid: Pid, is_foreground: bool, now: Instant) -> Result<ApplyOutcome> {
        ensure_valid_pid(pid)?;

        let snapshot = self.snapshots.get_snapshot(now);
        if let Some(reason) = self.filter.skip_reason(pid, &snapshot) {
            self.stats.record_filter_skip();
            trace!(pid, ?reason, "Process left alone");
            return Ok(ApplyOutcome::Skipped { reason });
        }

        let role = Role::from_foreground(is_foreground);
        if is_foreground {
            self.resume_if_suspended(pid);
        }
        self.track_role(pid, role, now);

        if !self.modules.is_enabled(Module::Settings) {
            return Ok(ApplyOutcome::Disabled);
        }

        if self.decisions.is_cached(pid, DecisionKind::Settings, role, now) {
            self.stats.record_cache_skip();
            let trimmed = !is_foreground && self.trim_if_due(pid, now);
            return Ok(ApplyOutcome::Cached { trimmed });
        }

        let profile = match snapshot.get(pid) {
            Some(entry) if is_foreground => self.profiles.detect(&entry.name).settings(),
            _ => ProfileSettings::default(),
        };
        let desired = self.compute_desired(role, pid, &profile, now);

        let trim_rss = if desired.trim { self.trim_candidate(pid, now) } else { None };
        let batch = match self.applied.lock().get(&pid) {
            Some(applied) => desired.diff(applied, trim_rss.is_some()),
            None => desired.diff(&AppliedState::default(), trim_rss.is_some()),
        };

        self.stats.record_application();
        if batch.is_empty() {
            self.store_decision(pid, role, now);
            self.tune_foreground(pid, is_foreground, desired.io_priority);
            return Ok(ApplyOutcome::Applied {
                report: ApplyReport::default(),
            });
        }

        let report = self.applicator.apply(pid, &batch);
        self.commit(pid, &batch, &report);

        if let Some(before) = trim_rss {
            if report.succeeded(Knob::TrimWorkingSet) {
                self.finish_trim(pid, before, now);
            }
        }

        for (knob, error) in &report.failed {
            debug!(pid, knob = %knob, error = %error, "Knob not applied");
        }
        if !report.applied.is_empty() {
            self.store_decision(pid, role, now);
        }

        if report.succeeded(Knob::PriorityClass) {
            self.validator.validate_priority(pid, desired.priority);
        }
        if report.succeeded(Knob::Affinity) {
            self.validator.validate_affinity(pid, &desired.cores);
        }

        self.tune_foreground(pid, is_foreground, desired.io_priority);

        Ok(ApplyOutcome::Applied { report })
    }

    /// One-time tuning for a foreground pid; later calls are no-ops
    fn tune_foreground(&self, pid: Pid, is_foreground: bool, io_priority: IoPriority) {
        if !is_foreground || !self.modules.is_enabled(Module::Tuning) {
            return;
        }
        let tuning = self.tuner.tune(pid, io_priority);
        if !tuning.applied.is_empty() {
            debug!(pid, applied = ?tuning.applied, workload = ?tuning.workload, "Foreground tuning applied");
        }
    }

    /// Desired state a pid would get in the given role right now
    pub fn desired_settings_for_role(&self, is_foreground: bool, pid: Pid, now: Instant) -> DesiredState {
        let role = Role::from_foreground(is_foreground);
        let profile = match self.snapshots.latest().as_ref().and_then(|s| s.get(pid).cloned()) {
            Some(entry) if is_foreground => ProfileDetector::classify(&entry.name).settings(),
            _ => ProfileSettings::default(),
        };
        self.compute_desired(role, pid, &profile, now)
    }

    fn compute_desired(&self, role: Role, pid: Pid, profile: &ProfileSettings, now: Instant) -> DesiredState {
        DesiredState::compute(
            role,
            self.minimized_for(pid, now),
            profile,
            &self.topology,
            Duration::from_secs(self.config.decisions.long_minimized_secs),
        )
    }

    /// Record successes only; failed knobs stay at their previous value
    pub(crate) fn commit(&self, pid: Pid, batch: &SettingsBatch, report: &ApplyReport) {
        self.stats.add_knobs_applied(report.applied.len() as u64);
        self.stats.add_knobs_failed(report.failed.len() as u64);
        if report.applied.is_empty() {
            return;
        }

        let mut applied = self.applied.lock();
        let state = applied.entry(pid).or_default();
        for knob in &report.applied {
            if let Some(value) = batch.get(knob) {
                state.record(*knob, value.clone());
            }
        }
    }

    fn store_decision(&self, pid: Pid, role: Role, now: Instant) {
        if let Err(e) = self.decisions.store(pid, DecisionKind::Settings, role, now) {
            debug!(pid, error = %e, "Decision not cached");
        }
    }

    fn track_role(&self, pid: Pid, role: Role, now: Instant) {
        let previous = {
            let mut states = self.process_states.lock();
            match states.get_mut(&pid) {
                Some(state) => {
                    let previous = state.role;
                    state.observe(role, now);
                    Some(previous)
                }
                None => {
                    states.insert(pid, ProcessState::new(role, now));
                    None
                }
            }
        };

        self.trimmer.mark_foreground(pid, role.is_foreground(), now);
        match (previous, role) {
            (_, Role::Foreground) => {
                self.minimized.lock().remove(&pid);
            }
            (previous, Role::Background) => {
                if previous == Some(Role::Foreground) {
                    self.tuner.reset(pid);
                }
                self.minimized.lock().entry(pid).or_insert(now);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Working-set trim
    // ---------------------------------------------------------------------

    /// Resident size to trim from, when the trim policy says a trim is due
    fn trim_candidate(&self, pid: Pid, now: Instant) -> Option<u64> {
        if !self.modules.is_enabled(Module::Trim) {
            return None;
        }
        let rss = match self.platform.memory_usage(pid) {
            Ok(rss) => rss,
            Err(e) => {
                trace!(pid, error = %e, "Resident size unavailable");
                return None;
            }
        };
        self.trimmer.should_trim(pid, rss, now).then_some(rss)
    }

    fn trim_if_due(&self, pid: Pid, now: Instant) -> bool {
        let Some(before) = self.trim_candidate(pid, now) else {
            return false;
        };
        let batch = SettingsBatch::from([(Knob::TrimWorkingSet, KnobValue::Flag(true))]);
        let report = self.applicator.apply(pid, &batch);
        if !report.succeeded(Knob::TrimWorkingSet) {
            return false;
        }
        self.finish_trim(pid, before, now);
        true
    }

    fn finish_trim(&self, pid: Pid, before: u64, now: Instant) {
        let after = self.platform.memory_usage(pid).unwrap_or(before);
        let effectiveness = self.trimmer.record_trim(pid, before, after, now);
        self.stats.record_trim();
        debug!(pid, before, after, effectiveness, "Working set trimmed");
    }

    // ---------------------------------------------------------------------
    // Suspension
    // ---------------------------------------------------------------------

    pub(crate) fn resume_if_suspended(&self, pid: Pid) {
        if !self.suspension.is_suspended(pid) {
            return;
        }
        match self.suspension.resume(pid) {
            Ok(true) => self.stats.record_resume(),
            Ok(false) => {}
            Err(e) => debug!(pid, error = %e, "Resume failed"),
        }
    }

    // ---------------------------------------------------------------------
    // Minimized tracking
    // ---------------------------------------------------------------------

    /// Note that `pid` was minimized at `at`
    pub fn record_minimized(&self, pid: Pid, at: Instant) {
        self.minimized.lock().insert(pid, at);
    }

    pub fn clear_minimized(&self, pid: Pid) {
        self.minimized.lock().remove(&pid);
    }

    pub fn minimized_for(&self, pid: Pid, now: Instant) -> Option<Duration> {
        self.minimized
            .lock()
            .get(&pid)
            .map(|at| now.saturating_duration_since(*at))
    }

    // ---------------------------------------------------------------------
    // Modules
    // ---------------------------------------------------------------------

    /// Switch a module on or off by name
    pub fn toggle_module(&self, name: &str, enabled: bool) -> Result<()> {
        let module: Module = name.parse()?;
        let previous = self.modules.set(module, enabled);
        info!(module = %module, enabled, previous, "Module toggled");

        if module == Module::Suspension && !enabled {
            let resumed = self.suspension.resume_all();
            self.stats.add_resumes(resumed as u64);
        }
        Ok(())
    }

    pub fn is_module_enabled(&self, module: Module) -> bool {
        self.modules.is_enabled(module)
    }

    // ---------------------------------------------------------------------
    // Foreground events
    // ---------------------------------------------------------------------

    /// Sender for native foreground-change hooks
    pub fn foreground_sender(&self) -> flume::Sender<Pid> {
        self.events_tx.clone()
    }

    pub(crate) fn foreground_events(&self) -> flume::Receiver<Pid> {
        self.events_rx.clone()
    }

    /// Raw foreground event; committed later by `tick`
    pub fn request_foreground_change(&self, pid: Pid, now: Instant) -> Result<()> {
        if pid == 0 {
            return Err(OptimizerError::InvalidPid(pid));
        }
        self.debouncer.request_foreground_change(pid, now);
        Ok(())
    }

    /// Pid whose group currently holds foreground settings
    pub fn current_foreground(&self) -> Option<Pid> {
        *self.foreground.lock()
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn ProcessPlatform> {
        &self.platform
    }

    pub fn topology(&self) -> &HardwareTopology {
        &self.topology
    }

    pub fn handles(&self) -> &HandleCache {
        &self.handles
    }

    pub fn decisions(&self) -> &DecisionCache {
        &self.decisions
    }

    pub fn trimmer(&self) -> &WorkingSetTrimmer {
        &self.trimmer
    }

    pub fn suspension(&self) -> &SuspensionManager {
        &self.suspension
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn validator(&self) -> &IntegrityValidator {
        &self.validator
    }

    pub fn profiles(&self) -> &ProfileDetector {
        &self.profiles
    }

    pub fn debouncer(&self) -> &ForegroundDebouncer {
        &self.debouncer
    }

    pub fn applied_state(&self, pid: Pid) -> Option<AppliedState> {
        self.applied.lock().get(&pid).cloned()
    }

    pub fn background_since(&self, pid: Pid) -> Option<Instant> {
        self.process_states.lock().get(&pid).and_then(|s| s.background_since)
    }

    pub fn tracked_processes(&self) -> usize {
        self.process_states.lock().len()
    }

    pub fn stats(&self) -> ManagerStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IoPriority, PagePriority, PriorityClass};
    use crate::core::errors::PlatformError;
    use crate::platform::{PlatformCall, ProcessEntry, SimulationPlatform};

    fn setup() -> (Arc<SimulationPlatform>, UnifiedProcessManager) {
        let sim = Arc::new(SimulationPlatform::new());
        sim.spawn_with(ProcessEntry::new(1000, 1, "editor.exe").with_user("alice"), 4, 64 << 20);
        sim.spawn_with(ProcessEntry::new(2000, 1, "steam.exe").with_user("alice"), 4, 64 << 20);
        let manager = UnifiedProcessManager::builder()
            .with_platform(sim.clone())
            .with_topology(HardwareTopology::uniform(8))
            .build()
            .unwrap();
        (sim, manager)
    }

    #[test]
    fn test_pid_zero_rejected() {
        let (_sim, manager) = setup();
        let err = manager.apply_all_settings(0, true, Instant::now()).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPid(0)));
    }

    #[test]
    fn test_background_batch_applied_and_recorded() {
        let (sim, manager) = setup();
        let now = Instant::now();

        let outcome = manager.apply_all_settings(1000, false, now).unwrap();
        let report = outcome.report().unwrap();
        assert!(report.succeeded(Knob::PriorityClass));
        assert_eq!(sim.process(1000).unwrap().priority, PriorityClass::Idle);

        let applied = manager.applied_state(1000).unwrap();
        assert_eq!(applied.get(Knob::IoPriority), Some(&KnobValue::Io(IoPriority::VeryLow)));
        assert!(manager.background_since(1000).is_some());
    }

    #[test]
    fn test_failed_knob_not_recorded() {
        let (sim, manager) = setup();
        sim.fail(1000, "set_io_priority", PlatformError::access_denied(1000, "set_io_priority"));

        let outcome = manager.apply_all_settings(1000, false, Instant::now()).unwrap();
        let report = outcome.report().unwrap();
        assert!(!report.succeeded(Knob::IoPriority));
        assert!(report.succeeded(Knob::PriorityClass));

        let applied = manager.applied_state(1000).unwrap();
        assert!(applied.get(Knob::IoPriority).is_none());
        assert!(applied.get(Knob::PriorityClass).is_some());
        assert_eq!(manager.stats().knobs_failed, 1);
    }

    #[test]
    fn test_decision_cache_skips_second_pass() {
        let (sim, manager) = setup();
        let now = Instant::now();
        manager.apply_all_settings(1000, false, now).unwrap();
        sim.clear_calls();

        let outcome = manager.apply_all_settings(1000, false, now + Duration::from_secs(1)).unwrap();
        assert_eq!(outcome, ApplyOutcome::Cached { trimmed: false });
        assert!(sim.actuation_calls().is_empty());
        assert_eq!(manager.stats().cache_skips, 1);
    }

    #[test]
    fn test_role_change_bypasses_cache() {
        let (_sim, manager) = setup();
        let now = Instant::now();
        manager.apply_all_settings(1000, false, now).unwrap();

        let outcome = manager.apply_all_settings(1000, true, now + Duration::from_secs(1)).unwrap();
        let report = outcome.report().unwrap();
        assert!(report.succeeded(Knob::PriorityClass));
        assert_eq!(manager.background_since(1000), None);
    }

    #[test]
    fn test_foreground_profile_raises_priority() {
        let (sim, manager) = setup();
        manager.apply_all_settings(2000, true, Instant::now()).unwrap();
        assert_eq!(sim.process(2000).unwrap().priority, PriorityClass::High);
        assert_eq!(manager.profiles().current(), crate::process::Profile::Gaming);
    }

    #[test]
    fn test_settings_module_disabled() {
        let (sim, manager) = setup();
        manager.toggle_module("settings", false).unwrap();
        let outcome = manager.apply_all_settings(1000, false, Instant::now()).unwrap();
        assert_eq!(outcome, ApplyOutcome::Disabled);
        assert!(sim.actuation_calls().is_empty());
    }

    #[test]
    fn test_unknown_module_rejected() {
        let (_sim, manager) = setup();
        assert!(matches!(
            manager.toggle_module("overclock", true),
            Err(OptimizerError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_foreground_resumes_before_applying() {
        let (sim, manager) = setup();
        let now = Instant::now();
        manager.suspension().suspend(1000, now).unwrap();
        sim.clear_calls();

        manager.apply_all_settings(1000, true, now).unwrap();
        let calls = sim.actuation_calls();
        assert_eq!(calls.first(), Some(&PlatformCall::Resume { pid: 1000 }));
        assert!(!sim.is_suspended(1000));
    }

    #[test]
    fn test_minimized_bucket() {
        let (_sim, manager) = setup();
        let t0 = Instant::now();
        manager.record_minimized(1000, t0);

        let fresh = manager.desired_settings_for_role(false, 1000, t0 + Duration::from_secs(60));
        assert_eq!(fresh.page_priority, PagePriority::Medium);

        let stale = manager.desired_settings_for_role(false, 1000, t0 + Duration::from_secs(1801));
        assert_eq!(stale.page_priority, PagePriority::Lowest);

        let foreground = manager.desired_settings_for_role(true, 1000, t0 + Duration::from_secs(1801));
        assert_eq!(foreground.page_priority, PagePriority::Normal);
    }

    #[test]
    fn test_tuning_runs_when_settings_already_applied() {
        let (sim, manager) = setup();
        let t0 = Instant::now();
        manager.toggle_module("tuning", false).unwrap();
        manager.apply_all_settings(1000, true, t0).unwrap();
        assert!(!manager.tuner.is_tuned(1000));

        manager.toggle_module("tuning", true).unwrap();
        sim.clear_calls();
        manager
            .apply_all_settings(1000, true, t0 + Duration::from_secs(301))
            .unwrap();

        assert!(manager.tuner.is_tuned(1000));
        assert!(sim.actuation_calls().contains(&PlatformCall::SetTurbo { enabled: true }));
    }

    #[test]
    fn test_disabling_suspension_resumes_everything() {
        let (sim, manager) = setup();
        manager.toggle_module("suspension", true).unwrap();
        manager.suspension().suspend(1000, Instant::now()).unwrap();

        manager.toggle_module("suspension", false).unwrap();
        assert!(!sim.is_suspended(1000));
        assert!(!manager.is_module_enabled(Module::Suspension));
    }
}
