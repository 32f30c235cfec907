/*!
 * Scenario Tests
 * Foreground transitions, minimized buckets and suspension ordering
 */

use optimizer_kernel::core::types::{PagePriority, PriorityClass};
use optimizer_kernel::platform::{PlatformCall, ProcessEntry, SimulationPlatform};
use optimizer_kernel::{HardwareTopology, OptimizerConfig, UnifiedProcessManager};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn setup(config: OptimizerConfig) -> (Arc<SimulationPlatform>, UnifiedProcessManager) {
    let sim = Arc::new(SimulationPlatform::new());
    sim.spawn(ProcessEntry::new(1000, 1, "editor.exe").with_user("alice"));
    sim.spawn(ProcessEntry::new(2000, 1, "chat.exe").with_user("alice"));
    let manager = UnifiedProcessManager::builder()
        .with_config(config)
        .with_platform(sim.clone())
        .with_topology(HardwareTopology::uniform(8))
        .build()
        .unwrap();
    (sim, manager)
}

#[test]
fn test_backgrounded_process_page_priority_buckets() {
    let (_sim, manager) = setup(OptimizerConfig::default());
    let t0 = Instant::now();
    manager.apply_foreground_change(1000, t0).unwrap();

    let just_left = manager.desired_settings_for_role(false, 1000, t0);
    assert_eq!(just_left.page_priority, PagePriority::Medium);

    manager.record_minimized(1000, t0);
    let long_minimized = manager.desired_settings_for_role(false, 1000, t0 + Duration::from_secs(1_801));
    assert_eq!(long_minimized.page_priority, PagePriority::Lowest);
}

#[test]
fn test_backgrounded_by_foreground_switch_reaches_lowest_page_priority() {
    let (_sim, manager) = setup(OptimizerConfig::default());
    let t0 = Instant::now();
    manager.apply_foreground_change(1000, t0).unwrap();
    assert_eq!(manager.minimized_for(1000, t0), None);

    manager.apply_foreground_change(2000, t0).unwrap();
    let later = t0 + Duration::from_secs(1_900);
    assert!(manager.minimized_for(1000, later).is_some());
    assert_eq!(manager.minimized_for(2000, later), None);

    let settings = manager.desired_settings_for_role(false, 1000, later);
    assert_eq!(settings.page_priority, PagePriority::Lowest);
}

#[test]
fn test_debounced_switch_through_ticks() {
    let (sim, manager) = setup(OptimizerConfig::default());
    let t0 = Instant::now();

    manager.request_foreground_change(1000, t0).unwrap();
    manager.request_foreground_change(2000, t0 + Duration::from_millis(50)).unwrap();
    manager.request_foreground_change(1000, t0 + Duration::from_millis(90)).unwrap();

    manager.tick(t0 + Duration::from_millis(389));
    assert_eq!(manager.current_foreground(), None);

    manager.tick(t0 + Duration::from_millis(390));
    assert_eq!(manager.current_foreground(), Some(1000));
    assert_eq!(manager.stats().foreground_changes, 1);
    assert!(sim.process(1000).unwrap().priority >= PriorityClass::AboveNormal);
    assert_eq!(sim.process(2000).unwrap().priority, PriorityClass::Normal);
}

#[test]
fn test_suspended_process_resumed_before_foreground_settings() {
    let mut config = OptimizerConfig::default();
    config.modules.suspension = true;
    config.suspension.inactivity_threshold_secs = 10;
    let (sim, manager) = setup(config);
    let t0 = Instant::now();

    manager.apply_all_settings(2000, false, t0).unwrap();
    assert_eq!(manager.check_suspensions(t0 + Duration::from_secs(11)), 1);
    assert!(sim.is_suspended(2000));
    sim.clear_calls();

    manager.apply_foreground_change(2000, t0 + Duration::from_secs(12)).unwrap();
    let calls = sim.actuation_calls();
    assert_eq!(calls.first(), Some(&PlatformCall::Resume { pid: 2000 }));
    assert!(!sim.is_suspended(2000));
    assert_eq!(manager.stats().resumes, 1);
}

#[test]
fn test_long_background_process_gets_trimmed() {
    let (sim, manager) = setup(OptimizerConfig::default());
    sim.set_rss(2000, 600 << 20);
    sim.set_trim_yield(0.5);
    let t0 = Instant::now();

    manager.apply_all_settings(2000, false, t0).unwrap();
    let later = t0 + Duration::from_secs(901);
    manager.apply_all_settings(2000, false, later).unwrap();

    assert!(sim
        .actuation_calls()
        .contains(&PlatformCall::TrimWorkingSet { pid: 2000 }));
    assert_eq!(manager.stats().trims, 1);
    assert_eq!(manager.trimmer().history(2000).len(), 1);
    assert!(manager.trimmer().interval(2000).unwrap() <= Duration::from_secs(48));
}
