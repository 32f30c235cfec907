/*!
 * Trim Policy Tests
 * Interval adaptation from measured effectiveness
 */

use optimizer_kernel::process::{TrimReason, WorkingSetTrimmer};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

const MB: u64 = 1024 * 1024;

fn backgrounded(pid: u32, since: Instant) -> WorkingSetTrimmer {
    let trimmer = WorkingSetTrimmer::new();
    trimmer.mark_foreground(pid, false, since);
    trimmer
}

#[test]
fn test_effective_trim_shortens_interval() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    let now = start + Duration::from_secs(1_000);

    let effectiveness = trimmer.record_trim(7, 400 * MB, 300 * MB, now);
    assert!((effectiveness - 25.0).abs() < 1e-6);
    assert!(trimmer.interval(7).unwrap() <= Duration::from_secs(48));
}

#[test]
fn test_ineffective_trim_lengthens_interval() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    let now = start + Duration::from_secs(1_000);

    trimmer.record_trim(7, 400 * MB, 392 * MB, now);
    assert!(trimmer.interval(7).unwrap() >= Duration::from_secs(78));
}

#[test]
fn test_interval_stays_within_bounds() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    let mut now = start + Duration::from_secs(1_000);

    for _ in 0..20 {
        trimmer.record_trim(7, 400 * MB, 399 * MB, now);
        now += Duration::from_secs(400);
    }
    assert_eq!(trimmer.interval(7), Some(trimmer.policy().max_interval));

    for _ in 0..20 {
        trimmer.record_trim(7, 400 * MB, 100 * MB, now);
        now += Duration::from_secs(400);
    }
    assert_eq!(trimmer.interval(7), Some(trimmer.policy().min_interval));
}

#[test]
fn test_recent_background_never_trimmed() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    // First sighting only records the baseline
    assert_eq!(trimmer.trim_reason(7, 900 * MB, start), None);
    assert_eq!(trimmer.trim_reason(7, 900 * MB, start + Duration::from_secs(60)), None);
}

#[test]
fn test_large_resident_set_trimmed_aggressively() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    assert_eq!(trimmer.trim_reason(7, 600 * MB, start), None);
    assert_eq!(
        trimmer.trim_reason(7, 600 * MB, start + Duration::from_secs(901)),
        Some(TrimReason::Aggressive)
    );
}

#[test]
fn test_growth_over_baseline_reported() {
    let start = Instant::now();
    let trimmer = backgrounded(7, start);
    trimmer.trim_reason(7, 100 * MB, start);
    assert_eq!(
        trimmer.trim_reason(7, 130 * MB, start + Duration::from_secs(901)),
        Some(TrimReason::Growth)
    );
}

#[test]
fn test_foreground_process_never_trimmed() {
    let start = Instant::now();
    let trimmer = WorkingSetTrimmer::new();
    trimmer.mark_foreground(7, true, start);
    assert!(!trimmer.should_trim(7, 900 * MB, start + Duration::from_secs(3_600)));
}
