/*!
 * Optimizer Configuration
 *
 * JSON configuration with every field defaulted from `core::limits`.
 * Durations are stored as integer milliseconds or seconds, as the field
 * name says.
 */

use crate::core::errors::{ConfigError, OptimizerError};
use crate::core::limits::*;
use crate::process::{FilterLists, JobRates, TrimPolicy};
use crate::scheduler::TaskSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "OPTIMIZER_CONFIG";

/// Environment variable naming the allow-list file
pub const ALLOWLIST_ENV: &str = "OPTIMIZER_ALLOWLIST";

pub const DEFAULT_CONFIG_PATH: &str = "optimizer.json";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Interval and priority of one coalesced task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub interval_ms: u64,
    pub priority: u32,
}

impl TaskConfig {
    const fn new(interval_ms: u64, priority: u32) -> Self {
        Self { interval_ms, priority }
    }

    pub fn spec(&self, name: &str) -> TaskSpec {
        TaskSpec::new(name, Duration::from_millis(self.interval_ms), self.priority)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub allowlist_reload: TaskConfig,
    pub snapshot_refresh: TaskConfig,
    pub zombie_cleanup: TaskConfig,
    pub handle_cache_cleanup: TaskConfig,
    pub tuning_cleanup: TaskConfig,
    pub decision_cache_cleanup: TaskConfig,
    pub suspension_check: TaskConfig,
    /// Priorities of the tasks whose interval lives in another section
    pub foreground_check_priority: u32,
    pub tree_rebuild_priority: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allowlist_reload: TaskConfig::new(ALLOWLIST_RELOAD_INTERVAL_MS, ALLOWLIST_RELOAD_PRIORITY),
            snapshot_refresh: TaskConfig::new(SNAPSHOT_REFRESH_INTERVAL_MS, SNAPSHOT_REFRESH_PRIORITY),
            zombie_cleanup: TaskConfig::new(ZOMBIE_CLEANUP_INTERVAL_MS, ZOMBIE_CLEANUP_PRIORITY),
            handle_cache_cleanup: TaskConfig::new(HANDLE_CLEANUP_INTERVAL_MS, HANDLE_CLEANUP_PRIORITY),
            tuning_cleanup: TaskConfig::new(TUNING_CLEANUP_INTERVAL_MS, TUNING_CLEANUP_PRIORITY),
            decision_cache_cleanup: TaskConfig::new(DECISION_CLEANUP_INTERVAL_MS, DECISION_CLEANUP_PRIORITY),
            suspension_check: TaskConfig::new(SUSPENSION_CHECK_INTERVAL_MS, SUSPENSION_CHECK_PRIORITY),
            foreground_check_priority: FOREGROUND_CHECK_PRIORITY,
            tree_rebuild_priority: TREE_REBUILD_PRIORITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlesConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
}

impl Default for HandlesConfig {
    fn default() -> Self {
        Self {
            max_size: HANDLE_CACHE_MAX_SIZE,
            ttl_ms: HANDLE_TTL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub ttl_ms: u64,
    pub tree_rebuild_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ttl_ms: SNAPSHOT_TTL.as_millis() as u64,
            tree_rebuild_ms: TREE_REBUILD_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForegroundConfig {
    pub debounce_ms: u64,
    pub hysteresis_ms: u64,
    pub recent_window_ms: u64,
    /// Interval of the polled `foreground_check` task
    pub poll_interval_ms: u64,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            debounce_ms: FOREGROUND_DEBOUNCE.as_millis() as u64,
            hysteresis_ms: FOREGROUND_HYSTERESIS.as_millis() as u64,
            recent_window_ms: FOREGROUND_RECENT_WINDOW.as_millis() as u64,
            poll_interval_ms: FOREGROUND_CHECK_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionsConfig {
    pub ttl_secs: u64,
    pub max_size: usize,
    /// Minimized longer than this drops background page priority to the lowest bucket
    pub long_minimized_secs: u64,
}

impl Default for DecisionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DECISION_TTL.as_secs(),
            max_size: DECISION_CACHE_MAX_SIZE,
            long_minimized_secs: LONG_MINIMIZED_THRESHOLD.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub default_interval_secs: u64,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub min_background_secs: u64,
    pub growth_threshold_percent: f64,
    pub aggressive_threshold_mb: u64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: TRIM_DEFAULT_INTERVAL.as_secs(),
            min_interval_secs: TRIM_MIN_INTERVAL.as_secs(),
            max_interval_secs: TRIM_MAX_INTERVAL.as_secs(),
            min_background_secs: TRIM_MIN_BACKGROUND_TIME.as_secs(),
            growth_threshold_percent: TRIM_GROWTH_THRESHOLD_PERCENT,
            aggressive_threshold_mb: TRIM_AGGRESSIVE_THRESHOLD_BYTES / BYTES_PER_MB,
        }
    }
}

impl TrimConfig {
    pub fn policy(&self) -> TrimPolicy {
        TrimPolicy {
            default_interval: Duration::from_secs(self.default_interval_secs),
            min_interval: Duration::from_secs(self.min_interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs),
            min_background_time: Duration::from_secs(self.min_background_secs),
            growth_threshold_percent: self.growth_threshold_percent,
            aggressive_threshold_bytes: self.aggressive_threshold_mb.saturating_mul(BYTES_PER_MB),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub inactivity_threshold_secs: u64,
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: SUSPENSION_INACTIVITY_THRESHOLD.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub foreground_rate: u32,
    pub background_rate: u32,
    pub contended_rate: u32,
    pub contention_threshold: f32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            foreground_rate: JOB_FOREGROUND_CPU_RATE,
            background_rate: JOB_BACKGROUND_CPU_RATE,
            contended_rate: JOB_CONTENDED_CPU_RATE,
            contention_threshold: JOB_CONTENTION_THRESHOLD,
        }
    }
}

impl JobsConfig {
    pub fn rates(&self) -> JobRates {
        JobRates {
            foreground: self.foreground_rate,
            background: self.background_rate,
            contended: self.contended_rate,
            contention_threshold: self.contention_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListsConfig {
    #[serde(flatten)]
    pub lists: FilterLists,
    /// Optional `{"whitelist": [...]}` document reloaded on change
    pub allowlist_file: Option<PathBuf>,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            lists: FilterLists::defaults(),
            allowlist_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub standby_cooldown_secs: u64,
    pub poll_interval_secs: u64,
    pub ram_usage_percent: f32,
    pub cached_percent: f32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            standby_cooldown_secs: STANDBY_CLEAR_COOLDOWN.as_secs(),
            poll_interval_secs: STANDBY_POLL_INTERVAL.as_secs(),
            ram_usage_percent: STANDBY_RAM_USAGE_PERCENT,
            cached_percent: STANDBY_CACHED_PERCENT,
        }
    }
}

/// Optimizer subsystems that can be switched at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Settings,
    Groups,
    Jobs,
    Tuning,
    Trim,
    Suspension,
    Memory,
}

impl Module {
    pub const ALL: [Module; 7] = [
        Module::Settings,
        Module::Groups,
        Module::Jobs,
        Module::Tuning,
        Module::Trim,
        Module::Suspension,
        Module::Memory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Module::Settings => "settings",
            Module::Groups => "groups",
            Module::Jobs => "jobs",
            Module::Tuning => "tuning",
            Module::Trim => "trim",
            Module::Suspension => "suspension",
            Module::Memory => "memory",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| OptimizerError::UnknownModule(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub settings: bool,
    pub groups: bool,
    pub jobs: bool,
    pub tuning: bool,
    pub trim: bool,
    pub suspension: bool,
    pub memory: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            settings: true,
            groups: true,
            jobs: true,
            tuning: true,
            trim: true,
            suspension: false,
            memory: true,
        }
    }
}

impl ModulesConfig {
    pub fn is_enabled(&self, module: Module) -> bool {
        match module {
            Module::Settings => self.settings,
            Module::Groups => self.groups,
            Module::Jobs => self.jobs,
            Module::Tuning => self.tuning,
            Module::Trim => self.trim,
            Module::Suspension => self.suspension,
            Module::Memory => self.memory,
        }
    }
}

/// Complete optimizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub scheduler: SchedulerConfig,
    pub handles: HandlesConfig,
    pub snapshot: SnapshotConfig,
    pub foreground: ForegroundConfig,
    pub decisions: DecisionsConfig,
    pub trim: TrimConfig,
    pub suspension: SuspensionConfig,
    pub jobs: JobsConfig,
    pub lists: ListsConfig,
    pub maintenance: MaintenanceConfig,
    pub modules: ModulesConfig,
}

impl OptimizerConfig {
    /// Load from `OPTIMIZER_CONFIG` (or `optimizer.json`), apply environment overrides and validate
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            if std::env::var_os(CONFIG_ENV).is_some() {
                warn!(path = %path.display(), "Configuration file not found, using defaults");
            }
            Self::default()
        };

        if let Some(allowlist) = std::env::var_os(ALLOWLIST_ENV) {
            config.lists.allowlist_file = Some(PathBuf::from(allowlist));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_json(&raw)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject values the optimizer cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tasks = [
            ("scheduler.allowlist_reload", &self.scheduler.allowlist_reload),
            ("scheduler.snapshot_refresh", &self.scheduler.snapshot_refresh),
            ("scheduler.zombie_cleanup", &self.scheduler.zombie_cleanup),
            ("scheduler.handle_cache_cleanup", &self.scheduler.handle_cache_cleanup),
            ("scheduler.tuning_cleanup", &self.scheduler.tuning_cleanup),
            ("scheduler.decision_cache_cleanup", &self.scheduler.decision_cache_cleanup),
            ("scheduler.suspension_check", &self.scheduler.suspension_check),
        ];
        for (field, task) in tasks {
            non_zero(field, task.interval_ms)?;
        }

        non_zero("handles.max_size", self.handles.max_size as u64)?;
        non_zero("handles.ttl_ms", self.handles.ttl_ms)?;
        non_zero("snapshot.tree_rebuild_ms", self.snapshot.tree_rebuild_ms)?;
        non_zero("foreground.poll_interval_ms", self.foreground.poll_interval_ms)?;
        non_zero("decisions.ttl_secs", self.decisions.ttl_secs)?;
        if self.decisions.max_size < 2 {
            return Err(ConfigError::invalid("decisions.max_size", "must be at least 2"));
        }

        let trim = &self.trim;
        non_zero("trim.min_interval_secs", trim.min_interval_secs)?;
        if trim.min_interval_secs > trim.max_interval_secs {
            return Err(ConfigError::invalid(
                "trim.min_interval_secs",
                format!("{} exceeds max_interval_secs {}", trim.min_interval_secs, trim.max_interval_secs),
            ));
        }
        if !(trim.min_interval_secs..=trim.max_interval_secs).contains(&trim.default_interval_secs) {
            return Err(ConfigError::invalid(
                "trim.default_interval_secs",
                "must lie between min_interval_secs and max_interval_secs",
            ));
        }
        percent("trim.growth_threshold_percent", trim.growth_threshold_percent)?;

        for (field, rate) in [
            ("jobs.foreground_rate", self.jobs.foreground_rate),
            ("jobs.background_rate", self.jobs.background_rate),
            ("jobs.contended_rate", self.jobs.contended_rate),
        ] {
            if !(1..=100).contains(&rate) {
                return Err(ConfigError::invalid(field, format!("{} is outside 1..=100", rate)));
            }
        }
        percent("jobs.contention_threshold", self.jobs.contention_threshold as f64)?;

        non_zero("maintenance.poll_interval_secs", self.maintenance.poll_interval_secs)?;
        percent("maintenance.ram_usage_percent", self.maintenance.ram_usage_percent as f64)?;
        percent("maintenance.cached_percent", self.maintenance.cached_percent as f64)?;
        Ok(())
    }
}

fn non_zero(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn percent(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("{} is not a percentage", value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = OptimizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.handles.max_size, 256);
        assert_eq!(config.trim.policy().aggressive_threshold_bytes, TRIM_AGGRESSIVE_THRESHOLD_BYTES);
        assert!(!config.modules.suspension);
        assert!(config.lists.lists.deny_names.iter().any(|n| n == "svchost.exe"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OptimizerConfig::from_json(r#"{"handles": {"max_size": 64}, "modules": {"trim": false}}"#).unwrap();
        assert_eq!(config.handles.max_size, 64);
        assert_eq!(config.handles.ttl_ms, 30_000);
        assert!(!config.modules.trim);
        assert!(config.modules.settings);
    }

    #[test]
    fn test_flattened_lists() {
        let config = OptimizerConfig::from_json(r#"{"lists": {"allow_names": ["obs64.exe"]}}"#).unwrap();
        assert_eq!(config.lists.lists.allow_names, vec!["obs64.exe".to_string()]);
        assert!(config.lists.lists.deny_names.iter().any(|n| n == "csrss.exe"));
    }

    #[test]
    fn test_validate_rejects_inverted_trim_bounds() {
        let mut config = OptimizerConfig::default();
        config.trim.min_interval_secs = 400;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "trim.min_interval_secs"));
    }

    #[test]
    fn test_validate_rejects_bad_rates_and_sizes() {
        let mut config = OptimizerConfig::default();
        config.jobs.contended_rate = 0;
        assert!(config.validate().is_err());

        let mut config = OptimizerConfig::default();
        config.handles.max_size = 0;
        assert!(config.validate().is_err());

        let mut config = OptimizerConfig::default();
        config.maintenance.cached_percent = 140.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(OptimizerConfig::from_json("[1, 2]"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_module_parsing() {
        assert_eq!("Trim".parse::<Module>().unwrap(), Module::Trim);
        assert!(matches!("turbo".parse::<Module>(), Err(OptimizerError::UnknownModule(_))));
        assert_eq!(Module::Memory.index(), 6);
    }
}
