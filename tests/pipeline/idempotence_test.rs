/*!
 * Idempotence Tests
 * A second application of an unchanged desired state issues no OS calls
 */

use optimizer_kernel::platform::{PlatformCall, ProcessEntry, SimulationPlatform};
use optimizer_kernel::{ApplyOutcome, HardwareTopology, UnifiedProcessManager};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn setup() -> (Arc<SimulationPlatform>, UnifiedProcessManager) {
    let sim = Arc::new(SimulationPlatform::new());
    sim.spawn_with(ProcessEntry::new(500, 1, "blender.exe").with_user("alice"), 6, 300 << 20);
    let manager = UnifiedProcessManager::builder()
        .with_platform(sim.clone())
        .with_topology(HardwareTopology::uniform(8))
        .build()
        .unwrap();
    (sim, manager)
}

fn assert_idempotent(is_foreground: bool) {
    let (sim, manager) = setup();
    let now = Instant::now();

    let first = manager.apply_all_settings(500, is_foreground, now).unwrap();
    assert!(first.report().is_some_and(|r| !r.applied.is_empty()));
    sim.clear_calls();

    // Cached decision
    let second = manager
        .apply_all_settings(500, is_foreground, now + Duration::from_secs(1))
        .unwrap();
    assert_eq!(second, ApplyOutcome::Cached { trimmed: false });
    assert_eq!(sim.actuation_calls(), Vec::<PlatformCall>::new());

    // Without the cache the diff against applied state is empty
    manager.decisions().invalidate(500);
    let third = manager
        .apply_all_settings(500, is_foreground, now + Duration::from_secs(2))
        .unwrap();
    assert_eq!(third.report().map(|r| r.applied.len()), Some(0));
    assert_eq!(sim.actuation_calls(), Vec::<PlatformCall>::new());
}

#[test]
fn test_foreground_reapplication_is_free() {
    assert_idempotent(true);
}

#[test]
fn test_background_reapplication_is_free() {
    assert_idempotent(false);
}

#[test]
fn test_failed_knob_retried_next_cycle() {
    let (sim, manager) = setup();
    let now = Instant::now();
    sim.fail(
        500,
        "set_priority_class",
        optimizer_kernel::PlatformError::access_denied(500, "set_priority_class"),
    );
    manager.apply_all_settings(500, false, now).unwrap();
    sim.clear_failures();
    sim.clear_calls();

    manager.decisions().invalidate(500);
    manager
        .apply_all_settings(500, false, now + Duration::from_secs(1))
        .unwrap();
    let calls = sim.actuation_calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], PlatformCall::SetPriorityClass { pid: 500, .. }));
}
