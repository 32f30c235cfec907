/*!
 * Hot Path Benchmarks
 *
 * Coalescer selection per tick and cached handle lookups
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use optimizer_kernel::core::types::AccessMask;
use optimizer_kernel::platform::{ProcessEntry, SimulationPlatform};
use optimizer_kernel::process::HandleCache;
use optimizer_kernel::scheduler::{TaskSpec, TimerCoalescer};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn bench_tasks_due(c: &mut Criterion) {
    let mut group = c.benchmark_group("tasks_due");

    for count in [8usize, 64, 512] {
        let start = Instant::now();
        let mut coalescer = TimerCoalescer::new();
        for i in 0..count {
            let interval = Duration::from_millis(500 + (i as u64 * 37) % 10_000);
            coalescer
                .register(TaskSpec::new(format!("task{}", i), interval, (i % 10) as u32), start)
                .unwrap();
        }
        let now = start + Duration::from_secs(5);

        group.bench_with_input(BenchmarkId::from_parameter(count), &coalescer, |b, coalescer| {
            b.iter(|| black_box(coalescer.tasks_due(black_box(now))));
        });
    }

    group.finish();
}

fn bench_handle_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_cache");

    let sim = Arc::new(SimulationPlatform::new());
    for pid in 1..=256u32 {
        sim.spawn(ProcessEntry::new(pid, 0, "bench.exe"));
    }
    let cache = HandleCache::new(sim.clone());
    for pid in 1..=256u32 {
        cache.get_handle(pid, AccessMask::TUNE);
    }

    group.bench_function("hit", |b| {
        let mut pid = 0u32;
        b.iter(|| {
            pid = pid % 256 + 1;
            black_box(cache.get_handle(black_box(pid), AccessMask::TUNE))
        });
    });

    group.bench_function("miss_with_eviction", |b| {
        let small = HandleCache::with_limits(sim.clone(), 16, Duration::from_secs(30));
        let mut pid = 0u32;
        b.iter(|| {
            pid = pid % 256 + 1;
            black_box(small.get_handle(black_box(pid), AccessMask::TUNE))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_tasks_due, bench_handle_lookup);
criterion_main!(benches);
