/*!
 * Process Module
 * Per-process building blocks of the optimization pipeline
 */

pub mod applicator;
pub mod debouncer;
pub mod decision_cache;
pub mod desired;
pub mod filter;
pub mod handle_cache;
pub mod jobs;
pub mod profile;
pub mod snapshot;
pub mod suspension;
pub mod tree;
pub mod trim;
pub mod tuning;
pub mod validator;

// Re-export public API
pub use applicator::{ApplyReport, SettingsApplicator};
pub use debouncer::{DebounceState, DebouncerStats, ForegroundDebouncer};
pub use decision_cache::{DecisionCache, DecisionCacheStats, DecisionKind};
pub use desired::{AppliedState, DesiredState, Knob, KnobValue, SettingsBatch};
pub use filter::{AllowListFile, FilterLists, NameSet, ProcessFilter, SkipReason};
pub use handle_cache::{HandleCache, HandleCacheStats};
pub use jobs::{JobKey, JobRates, JobTable};
pub use profile::{Profile, ProfileDetector, ProfileSettings};
pub use snapshot::{ProcessSnapshot, ProcessSnapshotEngine};
pub use suspension::{SuspensionManager, SuspensionStats};
pub use tree::ProcessTreeCache;
pub use trim::{TrimEvent, TrimPolicy, TrimReason, TrimStats, WorkingSetTrimmer};
pub use tuning::{ForegroundTuner, Tuning, TuningReport, Workload};
pub use validator::{IntegrityValidator, ValidationKind, ValidationRecord, ValidationStats};
