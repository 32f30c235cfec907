/*!
 * Group Propagation
 * Foreground/background decisions spread over a process and its relatives
 */

use super::unified::{ApplyOutcome, UnifiedProcessManager};
use crate::config::Module;
use crate::core::errors::{ensure_valid_pid, Result};
use crate::core::types::{Pid, Role};
use crate::monitoring::OperationSpan;
use crate::process::{JobKey, Knob, KnobValue, ProcessSnapshot, SettingsBatch};
use ahash::RandomState;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

/// What one group application touched
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub root: Pid,
    pub role: Role,
    pub job: Option<JobKey>,
    /// Every member in group order, including filtered ones
    pub outcomes: Vec<(Pid, ApplyOutcome)>,
}

impl GroupReport {
    pub fn members(&self) -> Vec<Pid> {
        self.outcomes.iter().map(|(pid, _)| *pid).collect()
    }

    /// Members that went through the settings pipeline
    pub fn processed(&self) -> Vec<Pid> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_skipped())
            .map(|(pid, _)| *pid)
            .collect()
    }
}

impl UnifiedProcessManager {
    /// Root, its descendants, then same-name processes of the same user
    pub fn group_members(&self, root: Pid, snapshot: &ProcessSnapshot) -> Vec<Pid> {
        let mut seen: HashSet<Pid, RandomState> = HashSet::with_hasher(RandomState::new());
        let mut members = vec![root];
        seen.insert(root);

        for pid in self.tree.get_all_descendants(root) {
            if snapshot.contains(pid) && seen.insert(pid) {
                members.push(pid);
            }
        }

        if let Some(entry) = snapshot.get(root) {
            for &pid in snapshot.pids_by_name(&entry.name) {
                let same_user = snapshot
                    .get(pid)
                    .map(|other| other.user == entry.user)
                    .unwrap_or(false);
                if same_user && seen.insert(pid) {
                    members.push(pid);
                }
            }
        }
        members
    }

    /// Apply a role to a whole process group
    pub fn apply_settings_to_process_group(&self, root: Pid, is_foreground: bool, now: Instant) -> Result<GroupReport> {
        ensure_valid_pid(root)?;
        let span = OperationSpan::new("group_application");
        let _guard = span.enter();

        let role = Role::from_foreground(is_foreground);
        let snapshot = self.snapshots.get_snapshot(now);
        self.tree.rebuild_if_due(&snapshot, now);

        let members = if self.modules.is_enabled(Module::Groups) {
            self.group_members(root, &snapshot)
        } else {
            vec![root]
        };

        let mut outcomes = Vec::with_capacity(members.len());
        let mut targets = Vec::with_capacity(members.len());
        for pid in members {
            match self.filter.skip_reason(pid, &snapshot) {
                Some(reason) => {
                    self.stats.record_filter_skip();
                    outcomes.push((pid, ApplyOutcome::Skipped { reason }));
                }
                None => targets.push(pid),
            }
        }

        let job = if self.modules.is_enabled(Module::Jobs) && !targets.is_empty() {
            self.assign_job(root, &snapshot, role, &targets)
        } else {
            None
        };

        // Narrow affinity before the generic pipeline sees the members
        if !is_foreground && self.modules.is_enabled(Module::Settings) && self.topology.is_hybrid() {
            self.narrow_to_efficiency_cores(&targets);
        }

        for pid in targets {
            match self.apply_all_settings(pid, is_foreground, now) {
                Ok(outcome) => outcomes.push((pid, outcome)),
                Err(e) => debug!(pid, error = %e, "Group member not processed"),
            }
        }

        self.stats.record_group_application();
        span.record_items_processed(outcomes.len());
        span.record_result(true);
        debug!(root, ?role, members = outcomes.len(), "Group settings applied");

        Ok(GroupReport {
            root,
            role,
            job,
            outcomes,
        })
    }

    fn assign_job(&self, root: Pid, snapshot: &ProcessSnapshot, role: Role, targets: &[Pid]) -> Option<JobKey> {
        let key = JobKey::for_process(root, snapshot.get(root));
        self.jobs.ensure_job(&key, role)?;
        for &pid in targets {
            if let Err(e) = self.jobs.assign(pid, &key) {
                debug!(pid, job = %key, error = %e, "Job assignment failed");
            }
        }
        Some(key)
    }

    fn narrow_to_efficiency_cores(&self, targets: &[Pid]) {
        let cores = KnobValue::Cores(self.topology.background_cores());
        for &pid in targets {
            let current = self
                .applied
                .lock()
                .get(&pid)
                .and_then(|state| state.get(Knob::Affinity).cloned());
            if current.as_ref() == Some(&cores) {
                continue;
            }

            let batch = SettingsBatch::from([(Knob::Affinity, cores.clone())]);
            let report = self.applicator.apply(pid, &batch);
            self.commit(pid, &batch, &report);
        }
    }

    /// Commit a settled foreground change
    ///
    /// The new pid is resumed before anything else touches it; the previous
    /// foreground group is then moved to the background unless it belongs to
    /// the same application.
    pub fn apply_foreground_change(&self, pid: Pid, now: Instant) -> Result<()> {
        ensure_valid_pid(pid)?;
        let previous = self.foreground.lock().replace(pid);
        if previous == Some(pid) {
            return Ok(());
        }

        info!(pid, previous = ?previous, "Foreground changed");
        self.stats.record_foreground_change();
        self.resume_if_suspended(pid);
        self.apply_settings_to_process_group(pid, true, now)?;

        let Some(old) = previous else {
            return Ok(());
        };
        let snapshot = self.snapshots.get_snapshot(now);
        if !snapshot.contains(old) {
            return Ok(());
        }
        if JobKey::for_process(old, snapshot.get(old)) == JobKey::for_process(pid, snapshot.get(pid)) {
            debug!(pid, old, "Previous foreground shares the application, left in foreground");
            return Ok(());
        }

        self.tuner.reset(old);
        self.apply_settings_to_process_group(old, false, now)?;
        Ok(())
    }
}
