/*!
 * Handle Cache Tests
 * LRU bound, expiry and release of platform handles
 */

use optimizer_kernel::core::types::AccessMask;
use optimizer_kernel::platform::{ProcessEntry, SimulationPlatform};
use optimizer_kernel::process::HandleCache;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn platform_with(count: u32) -> Arc<SimulationPlatform> {
    let sim = Arc::new(SimulationPlatform::new());
    for pid in 1..=count {
        sim.spawn(ProcessEntry::new(pid, 0, &format!("worker{}.exe", pid)));
    }
    sim
}

#[test]
fn test_least_recently_used_evicted_at_capacity() {
    let sim = platform_with(300);
    let cache = HandleCache::with_limits(sim.clone(), 256, Duration::from_secs(30));
    let start = Instant::now();

    for pid in 1..=300u32 {
        let at = start + Duration::from_millis(pid as u64);
        assert!(cache.get_handle_at(pid, AccessMask::TUNE, at).is_some());
    }

    assert_eq!(cache.len(), 256);
    assert_eq!(sim.open_handle_count(), 256);
    for pid in 1..=44u32 {
        assert!(!cache.contains(pid, AccessMask::TUNE), "pid {} should be evicted", pid);
    }
    for pid in 45..=300u32 {
        assert!(cache.contains(pid, AccessMask::TUNE));
    }
    assert_eq!(cache.stats().evictions, 44);
}

#[test]
fn test_recently_used_handle_survives_eviction() {
    let sim = platform_with(4);
    let cache = HandleCache::with_limits(sim.clone(), 3, Duration::from_secs(30));
    let start = Instant::now();

    for pid in 1..=3u32 {
        cache.get_handle_at(pid, AccessMask::TUNE, start + Duration::from_millis(pid as u64));
    }
    // Touch the oldest so pid 2 becomes the eviction victim
    cache.get_handle_at(1, AccessMask::TUNE, start + Duration::from_millis(10));
    cache.get_handle_at(4, AccessMask::TUNE, start + Duration::from_millis(11));

    assert!(cache.contains(1, AccessMask::TUNE));
    assert!(!cache.contains(2, AccessMask::TUNE));
    assert_eq!(sim.open_handle_count(), 3);
}

#[test]
fn test_expired_handle_reopened() {
    let sim = platform_with(1);
    let cache = HandleCache::with_limits(sim.clone(), 8, Duration::from_secs(30));
    let start = Instant::now();

    let first = cache.get_handle_at(1, AccessMask::TUNE, start).unwrap();
    let raw = first.raw();
    drop(first);

    let second = cache
        .get_handle_at(1, AccessMask::TUNE, start + Duration::from_secs(31))
        .unwrap();
    assert_ne!(second.raw(), raw);
    assert_eq!(sim.open_handle_count(), 1);
}

#[test]
fn test_pid_zero_never_opened() {
    let sim = platform_with(1);
    let cache = HandleCache::new(sim.clone());
    assert!(cache.get_handle(0, AccessMask::QUERY).is_none());
    assert_eq!(sim.open_handle_count(), 0);
}

#[test]
fn test_close_all_releases_platform_handles() {
    let sim = platform_with(10);
    let cache = HandleCache::new(sim.clone());
    for pid in 1..=10u32 {
        cache.get_handle(pid, AccessMask::QUERY);
        cache.get_handle(pid, AccessMask::TUNE);
    }
    assert_eq!(sim.open_handle_count(), 20);
    assert_eq!(cache.close_all(), 20);
    assert_eq!(sim.open_handle_count(), 0);
}
