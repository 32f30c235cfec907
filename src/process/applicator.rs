/*!
 * Settings Applicator
 * Applies a batch of knobs to one process, each independently
 */

use super::desired::{Knob, KnobValue, SettingsBatch};
use super::handle_cache::HandleCache;
use crate::core::errors::{PlatformError, PlatformResult};
use crate::core::types::{IoPriority, Pid};
use crate::platform::{ProcessHandle, ProcessPlatform};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<Knob>,
    pub failed: Vec<(Knob, PlatformError)>,
}

impl ApplyReport {
    pub fn succeeded(&self, knob: Knob) -> bool {
        self.applied.contains(&knob)
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Best-effort knob actuation through the handle cache
pub struct SettingsApplicator {
    platform: Arc<dyn ProcessPlatform>,
    handles: Arc<HandleCache>,
}

impl SettingsApplicator {
    pub fn new(platform: Arc<dyn ProcessPlatform>, handles: Arc<HandleCache>) -> Self {
        Self { platform, handles }
    }

    /// Apply every knob in `batch`; a failing knob never stops the rest
    pub fn apply(&self, pid: Pid, batch: &SettingsBatch) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (&knob, value) in batch {
            let result = match self.handles.get_handle(pid, knob.access()) {
                Some(handle) => self.apply_knob(&handle, knob, value),
                None => Err(PlatformError::InvalidHandle(pid)),
            };

            match result {
                Ok(()) => {
                    trace!(pid, %knob, "Knob applied");
                    report.applied.push(knob);
                }
                Err(e) => {
                    debug!(pid, %knob, error = %e, "Knob not applied");
                    report.failed.push((knob, e));
                }
            }
        }
        report
    }

    fn apply_knob(&self, handle: &ProcessHandle, knob: Knob, value: &KnobValue) -> PlatformResult<()> {
        match (knob, value) {
            (Knob::Affinity, KnobValue::Cores(cores)) => self.platform.set_affinity(handle, cores),
            (Knob::PriorityClass, KnobValue::Priority(class)) => {
                self.platform.set_priority_class(handle, *class)
            }
            (Knob::IoPriority, KnobValue::Io(level)) => self.platform.set_io_priority(handle, *level),
            (Knob::ThreadIoPriority, KnobValue::Io(level)) => {
                self.apply_thread_io(handle.pid(), *level)
            }
            (Knob::PagePriority, KnobValue::Page(level)) => {
                self.platform.set_page_priority(handle, *level)
            }
            (Knob::PriorityBoost, KnobValue::Flag(disable)) => {
                self.platform.set_priority_boost(handle, *disable)
            }
            (Knob::EcoQos, KnobValue::Flag(enabled)) => self.platform.set_eco_qos(handle, *enabled),
            (Knob::TrimWorkingSet, KnobValue::Flag(true)) => self.platform.trim_working_set(handle),
            (Knob::TrimWorkingSet, KnobValue::Flag(false)) => Ok(()),
            (knob, value) => Err(PlatformError::InvalidArgument(format!(
                "{} cannot take {:?}",
                knob, value
            ))),
        }
    }

    pub fn apply_thread_io(&self, pid: Pid, level: IoPriority) -> PlatformResult<()> {
        set_thread_io_priorities(self.platform.as_ref(), pid, level)
    }
}

/// Per-thread I/O priority; threads that exit mid-walk are ignored
pub(crate) fn set_thread_io_priorities(
    platform: &dyn ProcessPlatform,
    pid: Pid,
    level: IoPriority,
) -> PlatformResult<()> {
    let threads = platform.list_threads(pid)?;
    if threads.is_empty() {
        return Err(PlatformError::NotFound(pid));
    }
    for tid in threads {
        match platform.set_thread_io_priority(tid, level) {
            Ok(()) | Err(PlatformError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CoreSet, PagePriority, PriorityClass};
    use crate::platform::{PlatformCall, ProcessEntry, SimulationPlatform};

    fn setup() -> (Arc<SimulationPlatform>, SettingsApplicator) {
        let sim = Arc::new(SimulationPlatform::new());
        sim.spawn_with(ProcessEntry::new(10, 1, "app"), 3, 64 * 1024 * 1024);
        let handles = Arc::new(HandleCache::new(sim.clone()));
        let applicator = SettingsApplicator::new(sim.clone(), handles);
        (sim, applicator)
    }

    #[test]
    fn test_partial_success_isolated() {
        let (sim, applicator) = setup();
        sim.fail(10, "set_page_priority", PlatformError::access_denied(10, "page"));

        let mut batch = SettingsBatch::new();
        batch.insert(Knob::PriorityClass, KnobValue::Priority(PriorityClass::Idle));
        batch.insert(Knob::PagePriority, KnobValue::Page(PagePriority::Medium));
        batch.insert(Knob::EcoQos, KnobValue::Flag(true));

        let report = applicator.apply(10, &batch);
        assert_eq!(report.applied, vec![Knob::PriorityClass, Knob::EcoQos]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Knob::PagePriority);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_thread_io_touches_every_thread() {
        let (sim, applicator) = setup();
        let mut batch = SettingsBatch::new();
        batch.insert(Knob::ThreadIoPriority, KnobValue::Io(IoPriority::VeryLow));

        let report = applicator.apply(10, &batch);
        assert!(report.succeeded(Knob::ThreadIoPriority));
        let thread_calls = sim
            .actuation_calls()
            .into_iter()
            .filter(|c| matches!(c, PlatformCall::SetThreadIoPriority { .. }))
            .count();
        assert_eq!(thread_calls, 3);
    }

    #[test]
    fn test_missing_process_fails_every_knob() {
        let (_sim, applicator) = setup();
        let mut batch = SettingsBatch::new();
        batch.insert(Knob::Affinity, KnobValue::Cores(CoreSet::new([0])));
        batch.insert(Knob::PriorityClass, KnobValue::Priority(PriorityClass::Idle));

        let report = applicator.apply(99, &batch);
        assert!(report.applied.is_empty());
        assert_eq!(report.failed.len(), 2);
    }

    #[test]
    fn test_mismatched_value_rejected() {
        let (_sim, applicator) = setup();
        let mut batch = SettingsBatch::new();
        batch.insert(Knob::Affinity, KnobValue::Flag(true));
        let report = applicator.apply(10, &batch);
        assert!(matches!(report.failed[0].1, PlatformError::InvalidArgument(_)));
    }
}
