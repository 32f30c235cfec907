/*!
 * Manager Builder
 * Builder pattern for UnifiedProcessManager construction
 */

use super::tasks::MaintenanceTask;
use super::unified::{ModuleFlags, UnifiedProcessManager};
use crate::config::OptimizerConfig;
use crate::core::errors::Result;
use crate::monitoring::ManagerStats;
use crate::platform::{select_platform, ProcessPlatform};
use crate::process::{
    AllowListFile, DecisionCache, ForegroundDebouncer, ForegroundTuner, HandleCache,
    IntegrityValidator, JobTable, ProcessFilter, ProcessSnapshotEngine, ProcessTreeCache,
    ProfileDetector, SettingsApplicator, SuspensionManager, WorkingSetTrimmer,
};
use crate::scheduler::TimerCoalescer;
use crate::topology::HardwareTopology;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Builder for UnifiedProcessManager
#[derive(Default)]
pub struct ManagerBuilder {
    config: Option<OptimizerConfig>,
    platform: Option<Arc<dyn ProcessPlatform>>,
    topology: Option<HardwareTopology>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Backend to actuate through; defaults to `select_platform()`
    pub fn with_platform(mut self, platform: Arc<dyn ProcessPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Host layout; defaults to `HardwareTopology::detect()`
    pub fn with_topology(mut self, topology: HardwareTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Validate configuration, construct every component and register maintenance tasks
    pub fn build(self) -> Result<UnifiedProcessManager> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let platform = self.platform.unwrap_or_else(select_platform);
        let topology = Arc::new(self.topology.unwrap_or_else(HardwareTopology::detect));

        let handles = Arc::new(HandleCache::with_limits(
            Arc::clone(&platform),
            config.handles.max_size,
            Duration::from_millis(config.handles.ttl_ms),
        ));

        let mut coalescer = TimerCoalescer::new();
        let now = Instant::now();
        for task in MaintenanceTask::ALL {
            coalescer.register(task.spec(&config), now)?;
        }

        let (events_tx, events_rx) = flume::unbounded();
        let foreground = &config.foreground;

        let manager = UnifiedProcessManager {
            snapshots: ProcessSnapshotEngine::with_ttl(
                Arc::clone(&platform),
                Duration::from_millis(config.snapshot.ttl_ms),
            ),
            tree: ProcessTreeCache::with_interval(Duration::from_millis(config.snapshot.tree_rebuild_ms)),
            debouncer: ForegroundDebouncer::with_delays(
                Duration::from_millis(foreground.debounce_ms),
                Duration::from_millis(foreground.hysteresis_ms),
                Duration::from_millis(foreground.recent_window_ms),
            ),
            decisions: DecisionCache::with_limits(
                Duration::from_secs(config.decisions.ttl_secs),
                config.decisions.max_size,
            ),
            applicator: SettingsApplicator::new(Arc::clone(&platform), Arc::clone(&handles)),
            trimmer: WorkingSetTrimmer::with_policy(config.trim.policy()),
            suspension: SuspensionManager::with_threshold(
                Arc::clone(&platform),
                Arc::clone(&handles),
                Duration::from_secs(config.suspension.inactivity_threshold_secs),
            ),
            jobs: JobTable::with_rates(Arc::clone(&platform), Arc::clone(&handles), config.jobs.rates()),
            filter: ProcessFilter::new(&config.lists.lists),
            allowlist: config.lists.allowlist_file.clone().map(AllowListFile::new),
            profiles: ProfileDetector::new(),
            validator: IntegrityValidator::new(Arc::clone(&platform), Arc::clone(&handles)),
            tuner: ForegroundTuner::new(Arc::clone(&platform), Arc::clone(&handles), Arc::clone(&topology)),
            coalescer: Mutex::new(coalescer),
            process_states: Mutex::new(HashMap::with_hasher(RandomState::new())),
            applied: Mutex::new(HashMap::with_hasher(RandomState::new())),
            minimized: Mutex::new(HashMap::with_hasher(RandomState::new())),
            foreground: Mutex::new(None),
            last_standby_clear: Mutex::new(None),
            modules: ModuleFlags::from_config(&config.modules),
            events_tx,
            events_rx,
            stats: ManagerStats::new(),
            handles,
            topology,
            platform,
            config,
        };

        // Pick up the allow-list before the first pass
        manager.reload_allowlist();

        info!(
            platform = manager.platform.name(),
            cores = manager.topology.logical_cores,
            hybrid = manager.topology.is_hybrid(),
            tasks = MaintenanceTask::ALL.len(),
            "Process manager initialized"
        );
        Ok(manager)
    }
}
