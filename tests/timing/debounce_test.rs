/*!
 * Foreground Debounce Tests
 */

use optimizer_kernel::process::{DebounceState, ForegroundDebouncer};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_burst_collapses_to_last_target() {
    let debouncer = ForegroundDebouncer::new();
    let t0 = Instant::now();

    debouncer.request_foreground_change(10, t0);
    debouncer.request_foreground_change(20, t0 + ms(50));
    debouncer.request_foreground_change(10, t0 + ms(90));

    assert_eq!(debouncer.fire_due(t0 + ms(389)), None);
    assert_eq!(debouncer.fire_due(t0 + ms(390)), Some(10));
    assert_eq!(debouncer.fire_due(t0 + ms(1_000)), None);

    let stats = debouncer.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.superseded, 2);
    assert_eq!(stats.commits, 1);
}

#[test]
fn test_return_to_committed_cancels_pending() {
    let debouncer = ForegroundDebouncer::new();
    let t0 = Instant::now();
    debouncer.request_foreground_change(10, t0);
    debouncer.fire_due(t0 + ms(300));

    debouncer.request_foreground_change(20, t0 + ms(400));
    debouncer.request_foreground_change(10, t0 + ms(450));
    assert_eq!(debouncer.state(), DebounceState::Idle);
    assert_eq!(debouncer.fire_due(t0 + ms(2_000)), None);
    assert_eq!(debouncer.committed(), Some(10));
}

#[test]
fn test_quick_return_to_previous_waits_longer() {
    let debouncer = ForegroundDebouncer::new();
    let t0 = Instant::now();
    debouncer.request_foreground_change(10, t0);
    debouncer.fire_due(t0 + ms(300));
    debouncer.request_foreground_change(20, t0 + ms(400));
    debouncer.fire_due(t0 + ms(700));

    // 10 lost the foreground at 700ms and comes back right away
    debouncer.request_foreground_change(10, t0 + ms(800));
    assert_eq!(debouncer.fire_due(t0 + ms(1_100)), None);
    assert_eq!(debouncer.fire_due(t0 + ms(1_250)), Some(10));
}

#[test]
fn test_fire_due_with_runs_callback_once() {
    let debouncer = ForegroundDebouncer::new();
    let t0 = Instant::now();
    debouncer.request_foreground_change(42, t0);

    let mut seen = Vec::new();
    assert!(debouncer.fire_due_with(t0 + ms(300), |pid| seen.push(pid)));
    assert!(!debouncer.fire_due_with(t0 + ms(600), |pid| seen.push(pid)));
    assert_eq!(seen, vec![42]);
}
