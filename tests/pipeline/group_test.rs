/*!
 * Group Propagation Tests
 */

use optimizer_kernel::platform::{ProcessEntry, SimulationPlatform};
use optimizer_kernel::process::SkipReason;
use optimizer_kernel::{ApplyOutcome, HardwareTopology, OptimizerConfig, UnifiedProcessManager};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

fn spawn_family(sim: &SimulationPlatform) {
    sim.spawn(ProcessEntry::new(100, 1, "game.exe").with_user("alice"));
    sim.spawn(ProcessEntry::new(101, 100, "crashpad.exe").with_user("alice"));
    sim.spawn(ProcessEntry::new(102, 100, "shadercache.exe").with_user("alice"));
    sim.spawn(ProcessEntry::new(200, 1, "game.exe").with_user("alice"));
    sim.spawn(ProcessEntry::new(300, 1, "game.exe").with_user("bob"));
    sim.spawn(ProcessEntry::new(400, 1, "notes.exe").with_user("alice"));
}

fn manager(config: OptimizerConfig) -> (Arc<SimulationPlatform>, UnifiedProcessManager) {
    let sim = Arc::new(SimulationPlatform::new());
    spawn_family(&sim);
    let manager = UnifiedProcessManager::builder()
        .with_config(config)
        .with_platform(sim.clone())
        .with_topology(HardwareTopology::uniform(8))
        .build()
        .unwrap();
    (sim, manager)
}

fn touched_pids(sim: &SimulationPlatform) -> BTreeSet<u32> {
    sim.actuation_calls().iter().filter_map(|c| c.pid()).collect()
}

#[test]
fn test_group_is_root_descendants_and_same_user_siblings() {
    let (sim, manager) = manager(OptimizerConfig::default());
    let report = manager
        .apply_settings_to_process_group(100, true, Instant::now())
        .unwrap();

    assert_eq!(report.processed(), vec![100, 101, 102, 200]);
    assert_eq!(touched_pids(&sim), BTreeSet::from([100, 101, 102, 200]));
}

#[test]
fn test_deny_listed_member_skipped() {
    let mut config = OptimizerConfig::default();
    config.lists.lists.deny_names.push("crashpad.exe".to_string());
    let (sim, manager) = manager(config);

    let report = manager
        .apply_settings_to_process_group(100, false, Instant::now())
        .unwrap();

    assert_eq!(report.members(), vec![100, 101, 102, 200]);
    assert_eq!(report.processed(), vec![100, 102, 200]);
    let skipped: Vec<&ApplyOutcome> = report
        .outcomes
        .iter()
        .filter(|(pid, _)| *pid == 101)
        .map(|(_, outcome)| outcome)
        .collect();
    assert_eq!(
        skipped,
        vec![&ApplyOutcome::Skipped {
            reason: SkipReason::DeniedName
        }]
    );
    assert_eq!(touched_pids(&sim), BTreeSet::from([100, 102, 200]));
}

#[test]
fn test_allow_listed_member_skipped() {
    let mut config = OptimizerConfig::default();
    config.lists.lists.allow_names.push("shadercache.exe".to_string());
    let (sim, manager) = manager(config);

    manager
        .apply_settings_to_process_group(100, true, Instant::now())
        .unwrap();
    assert_eq!(touched_pids(&sim), BTreeSet::from([100, 101, 200]));
}

#[test]
fn test_background_job_rate_follows_contention() {
    let (sim, manager) = manager(OptimizerConfig::default());
    sim.set_cpu_usage(80.0);

    let report = manager
        .apply_settings_to_process_group(300, false, Instant::now())
        .unwrap();
    let key = report.job.unwrap();
    assert_eq!(manager.jobs().cpu_rate(&key), Some(25));
}
