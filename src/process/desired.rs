/*!
 * Desired and Applied State
 * Per-process target configuration and the minimal diff against what was applied
 */

use super::profile::ProfileSettings;
use crate::core::types::{AccessMask, CoreSet, IoPriority, PagePriority, PriorityClass, Role};
use crate::topology::HardwareTopology;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One independently applicable OS setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Knob {
    Affinity,
    PriorityClass,
    IoPriority,
    ThreadIoPriority,
    PagePriority,
    PriorityBoost,
    EcoQos,
    TrimWorkingSet,
}

impl Knob {
    pub const ALL: [Knob; 8] = [
        Knob::Affinity,
        Knob::PriorityClass,
        Knob::IoPriority,
        Knob::ThreadIoPriority,
        Knob::PagePriority,
        Knob::PriorityBoost,
        Knob::EcoQos,
        Knob::TrimWorkingSet,
    ];

    /// Handle rights required to actuate this knob
    pub fn access(self) -> AccessMask {
        match self {
            Knob::TrimWorkingSet => AccessMask::QUERY | AccessMask::SET_QUOTA,
            _ => AccessMask::TUNE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Knob::Affinity => "affinity",
            Knob::PriorityClass => "priority_class",
            Knob::IoPriority => "io_priority",
            Knob::ThreadIoPriority => "thread_io_priority",
            Knob::PagePriority => "page_priority",
            Knob::PriorityBoost => "priority_boost",
            Knob::EcoQos => "eco_qos",
            Knob::TrimWorkingSet => "trim_working_set",
        }
    }

    /// Actions are not remembered in applied state
    pub fn is_action(self) -> bool {
        matches!(self, Knob::TrimWorkingSet)
    }
}

impl fmt::Display for Knob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by a knob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum KnobValue {
    Cores(CoreSet),
    Priority(PriorityClass),
    Io(IoPriority),
    Page(PagePriority),
    Flag(bool),
}

/// Knobs to apply in one batch, in a stable order
pub type SettingsBatch = BTreeMap<Knob, KnobValue>;

/// Target configuration for a process at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub role: Role,
    pub cores: CoreSet,
    pub priority: PriorityClass,
    pub io_priority: IoPriority,
    pub thread_io_priority: IoPriority,
    pub page_priority: PagePriority,
    pub disable_boost: bool,
    pub eco_qos: bool,
    /// Trimming is wanted for this role; the trim policy decides when
    pub trim: bool,
}

impl DesiredState {
    /// Pure function of role, minimized duration and profile
    pub fn compute(
        role: Role,
        minimized_for: Option<Duration>,
        profile: &ProfileSettings,
        topology: &HardwareTopology,
        long_minimized: Duration,
    ) -> Self {
        match role {
            Role::Foreground => {
                let io = profile.io_priority.max(IoPriority::Normal);
                Self {
                    role,
                    cores: topology.foreground_cores(),
                    priority: profile.priority.max(PriorityClass::AboveNormal),
                    io_priority: io,
                    thread_io_priority: io,
                    page_priority: PagePriority::Normal,
                    disable_boost: false,
                    eco_qos: false,
                    trim: false,
                }
            }
            Role::Background => {
                let page_priority = match minimized_for {
                    Some(d) if d > long_minimized => PagePriority::Lowest,
                    _ => PagePriority::Medium,
                };
                Self {
                    role,
                    cores: topology.background_cores(),
                    priority: PriorityClass::Idle,
                    io_priority: IoPriority::VeryLow,
                    thread_io_priority: IoPriority::VeryLow,
                    page_priority,
                    disable_boost: false,
                    eco_qos: true,
                    trim: true,
                }
            }
        }
    }

    /// Desired value of a stateful knob
    pub fn value(&self, knob: Knob) -> Option<KnobValue> {
        let value = match knob {
            Knob::Affinity => KnobValue::Cores(self.cores.clone()),
            Knob::PriorityClass => KnobValue::Priority(self.priority),
            Knob::IoPriority => KnobValue::Io(self.io_priority),
            Knob::ThreadIoPriority => KnobValue::Io(self.thread_io_priority),
            Knob::PagePriority => KnobValue::Page(self.page_priority),
            Knob::PriorityBoost => KnobValue::Flag(self.disable_boost),
            Knob::EcoQos => KnobValue::Flag(self.eco_qos),
            Knob::TrimWorkingSet => return None,
        };
        Some(value)
    }

    /// Knobs whose desired value differs from what was applied
    ///
    /// A trim is appended only when wanted for this role and `trim_due`.
    pub fn diff(&self, applied: &AppliedState, trim_due: bool) -> SettingsBatch {
        let mut batch: SettingsBatch = Knob::ALL
            .into_iter()
            .filter_map(|knob| {
                let desired = self.value(knob)?;
                (applied.get(knob) != Some(&desired)).then_some((knob, desired))
            })
            .collect();

        if self.trim && trim_due {
            batch.insert(Knob::TrimWorkingSet, KnobValue::Flag(true));
        }
        batch
    }
}

/// Last values confirmed written to the OS for one process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    fields: BTreeMap<Knob, KnobValue>,
}

impl AppliedState {
    pub fn get(&self, knob: Knob) -> Option<&KnobValue> {
        self.fields.get(&knob)
    }

    /// Record a successful application; actions are ignored
    pub fn record(&mut self, knob: Knob, value: KnobValue) {
        if !knob.is_action() {
            self.fields.insert(knob, value);
        }
    }

    pub fn forget(&mut self, knob: Knob) {
        self.fields.remove(&knob);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::LONG_MINIMIZED_THRESHOLD;
    use crate::process::profile::Profile;

    fn compute(role: Role, minimized_for: Option<Duration>) -> DesiredState {
        DesiredState::compute(
            role,
            minimized_for,
            &ProfileSettings::default(),
            &HardwareTopology::hybrid(4, 4),
            LONG_MINIMIZED_THRESHOLD,
        )
    }

    #[test]
    fn test_foreground_table() {
        let desired = compute(Role::Foreground, None);
        assert_eq!(desired.cores, CoreSet::all(8));
        assert_eq!(desired.priority, PriorityClass::AboveNormal);
        assert_eq!(desired.io_priority, IoPriority::Normal);
        assert_eq!(desired.page_priority, PagePriority::Normal);
        assert!(!desired.eco_qos);
        assert!(!desired.trim);
    }

    #[test]
    fn test_high_profile_raises_priority() {
        let desired = DesiredState::compute(
            Role::Foreground,
            None,
            &Profile::Gaming.settings(),
            &HardwareTopology::uniform(4),
            LONG_MINIMIZED_THRESHOLD,
        );
        assert_eq!(desired.priority, PriorityClass::High);
        assert_eq!(desired.thread_io_priority, IoPriority::High);
    }

    #[test]
    fn test_background_page_buckets() {
        assert_eq!(compute(Role::Background, None).page_priority, PagePriority::Medium);
        assert_eq!(
            compute(Role::Background, Some(Duration::from_secs(1800))).page_priority,
            PagePriority::Medium
        );
        assert_eq!(
            compute(Role::Background, Some(Duration::from_secs(1801))).page_priority,
            PagePriority::Lowest
        );
    }

    #[test]
    fn test_diff_only_changed_fields() {
        let desired = compute(Role::Background, None);
        let mut applied = AppliedState::default();
        assert_eq!(desired.diff(&applied, false).len(), 7);

        for knob in Knob::ALL {
            if let Some(value) = desired.value(knob) {
                applied.record(knob, value);
            }
        }
        assert!(desired.diff(&applied, false).is_empty());

        applied.record(Knob::PagePriority, KnobValue::Page(PagePriority::Normal));
        let batch = desired.diff(&applied, false);
        assert_eq!(batch.keys().copied().collect::<Vec<_>>(), vec![Knob::PagePriority]);
    }

    #[test]
    fn test_trim_only_when_due_and_wanted() {
        let background = compute(Role::Background, None);
        let foreground = compute(Role::Foreground, None);
        let applied = AppliedState::default();
        assert!(background.diff(&applied, true).contains_key(&Knob::TrimWorkingSet));
        assert!(!background.diff(&applied, false).contains_key(&Knob::TrimWorkingSet));
        assert!(!foreground.diff(&applied, true).contains_key(&Knob::TrimWorkingSet));
    }

    #[test]
    fn test_actions_not_recorded() {
        let mut applied = AppliedState::default();
        applied.record(Knob::TrimWorkingSet, KnobValue::Flag(true));
        assert!(applied.is_empty());
    }
}
