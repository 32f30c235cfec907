/*!
 * Optimizer Limits and Constants
 *
 * Centralized location for every default threshold, interval and bound.
 * Organized by domain; configuration overrides start from these values.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Values that bound memory growth are marked with [BOUND]
 */

use std::time::Duration;

// =============================================================================
// TIMER COALESCING
// =============================================================================

/// Coalescence window as a fraction of the task interval
pub const COALESCE_WINDOW_RATIO: f64 = 0.1;

/// Execution budget as a fraction of the task interval
pub const EXECUTION_BUDGET_RATIO: f64 = 0.5;

/// Adaptive multiplier bounds
pub const ADAPTIVE_MULTIPLIER_MIN: f64 = 0.8;
pub const ADAPTIVE_MULTIPLIER_MAX: f64 = 1.5;

/// Per-execution adjustment factors for the adaptive multiplier
pub const ADAPTIVE_SHRINK_FACTOR: f64 = 0.98;
pub const ADAPTIVE_GROW_FACTOR: f64 = 1.02;

/// Average cost below this share of the budget shrinks the multiplier
pub const ADAPTIVE_LOW_COST_RATIO: f64 = 0.5;

/// Average cost above this share of the budget grows the multiplier
pub const ADAPTIVE_HIGH_COST_RATIO: f64 = 0.8;

/// Overdue urgency ceiling
pub const MAX_OVERDUE_URGENCY: f64 = 10.0;

/// Rolling-average execution count is rescaled past this value [BOUND]
pub const EXECUTION_COUNT_RESET: u64 = 1_000_000;

/// Sleep bounds for the main loop
/// [PERF] Lower bound prevents busy-waiting
pub const MIN_WAKE: Duration = Duration::from_millis(1);
pub const MAX_WAKE: Duration = Duration::from_secs(5);

/// Sleep used when nothing is registered
pub const IDLE_WAKE: Duration = Duration::from_millis(100);

// =============================================================================
// MAINTENANCE TASK SCHEDULE (interval ms, priority)
// =============================================================================

pub const ALLOWLIST_RELOAD_INTERVAL_MS: u64 = 10_000;
pub const ALLOWLIST_RELOAD_PRIORITY: u32 = 3;

pub const SNAPSHOT_REFRESH_INTERVAL_MS: u64 = 1_000;
pub const SNAPSHOT_REFRESH_PRIORITY: u32 = 8;

pub const ZOMBIE_CLEANUP_INTERVAL_MS: u64 = 5_000;
pub const ZOMBIE_CLEANUP_PRIORITY: u32 = 5;

pub const FOREGROUND_CHECK_INTERVAL_MS: u64 = 500;
pub const FOREGROUND_CHECK_PRIORITY: u32 = 9;

pub const TREE_REBUILD_PRIORITY: u32 = 6;

pub const HANDLE_CLEANUP_INTERVAL_MS: u64 = 10_000;
pub const HANDLE_CLEANUP_PRIORITY: u32 = 4;

pub const TUNING_CLEANUP_INTERVAL_MS: u64 = 30_000;
pub const TUNING_CLEANUP_PRIORITY: u32 = 2;

pub const DECISION_CLEANUP_INTERVAL_MS: u64 = 60_000;
pub const DECISION_CLEANUP_PRIORITY: u32 = 2;

pub const SUSPENSION_CHECK_INTERVAL_MS: u64 = 30_000;
pub const SUSPENSION_CHECK_PRIORITY: u32 = 3;

// =============================================================================
// HANDLES / SNAPSHOTS
// =============================================================================

/// Maximum cached process handles [BOUND]
pub const HANDLE_CACHE_MAX_SIZE: usize = 256;

/// Idle handles are closed after this long
pub const HANDLE_TTL: Duration = Duration::from_secs(30);

/// Process snapshot reuse window
/// [PERF] Bounds enumeration cost under bursty callers
pub const SNAPSHOT_TTL: Duration = Duration::from_millis(500);

/// Parent/child adjacency rebuild interval
pub const TREE_REBUILD_INTERVAL: Duration = Duration::from_millis(2_000);

/// Descendant traversal never visits more nodes than this [BOUND]
pub const MAX_TREE_TRAVERSAL: usize = 10_000;

// =============================================================================
// FOREGROUND DEBOUNCE
// =============================================================================

pub const FOREGROUND_DEBOUNCE: Duration = Duration::from_millis(300);
pub const FOREGROUND_HYSTERESIS: Duration = Duration::from_millis(150);

/// A previously committed pid counts as "recently left" for this long
pub const FOREGROUND_RECENT_WINDOW: Duration = Duration::from_millis(2_000);

// =============================================================================
// DECISIONS
// =============================================================================

pub const DECISION_TTL: Duration = Duration::from_secs(300);

/// Decision cache capacity; crossing it evicts the oldest half [BOUND]
pub const DECISION_CACHE_MAX_SIZE: usize = 10_000;

/// Background processes minimized longer than this get the lowest page priority
pub const LONG_MINIMIZED_THRESHOLD: Duration = Duration::from_secs(1_800);

// =============================================================================
// WORKING-SET TRIM
// =============================================================================

pub const TRIM_DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const TRIM_MIN_INTERVAL: Duration = Duration::from_secs(30);
pub const TRIM_MAX_INTERVAL: Duration = Duration::from_secs(300);

/// Freshly backgrounded processes are left alone this long
pub const TRIM_MIN_BACKGROUND_TIME: Duration = Duration::from_secs(900);

/// Growth since the last post-trim reading that justifies a trim (percent)
pub const TRIM_GROWTH_THRESHOLD_PERCENT: f64 = 20.0;

/// RSS above which trimming is always worthwhile
pub const TRIM_AGGRESSIVE_THRESHOLD_BYTES: u64 = 500 * 1024 * 1024;

/// Effectiveness above this shrinks the interval, below the low mark grows it
pub const TRIM_EFFECTIVE_PERCENT: f64 = 20.0;
pub const TRIM_INEFFECTIVE_PERCENT: f64 = 5.0;
pub const TRIM_SHRINK_FACTOR: f64 = 0.8;
pub const TRIM_GROW_FACTOR: f64 = 1.3;

/// Trims freeing more than this share count as significant
pub const TRIM_SIGNIFICANT_PERCENT: f64 = 10.0;

/// Trim events kept per pid [BOUND]
pub const TRIM_HISTORY_LEN: usize = 20;

// =============================================================================
// SUSPENSION
// =============================================================================

pub const SUSPENSION_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(3_600);

// =============================================================================
// JOBS
// =============================================================================

pub const JOB_FOREGROUND_CPU_RATE: u32 = 95;
pub const JOB_BACKGROUND_CPU_RATE: u32 = 50;
pub const JOB_CONTENDED_CPU_RATE: u32 = 25;

/// Total CPU usage (percent) at which background jobs are squeezed harder
pub const JOB_CONTENTION_THRESHOLD: f32 = 30.0;

// =============================================================================
// FOREGROUND TUNING
// =============================================================================

pub const SINGLE_THREAD_MAX_THREADS: usize = 2;
pub const LATENCY_SENSITIVE_MAX_THREADS: usize = 8;

/// Resident size that makes a foreground process large-page eligible
pub const LARGE_PAGE_MIN_RSS_BYTES: u64 = 256 * 1024 * 1024;

// =============================================================================
// INTEGRITY VALIDATION
// =============================================================================

/// Validation results kept for statistics [BOUND]
pub const VALIDATION_HISTORY_LEN: usize = 100;

// =============================================================================
// STANDBY CACHE MAINTENANCE
// =============================================================================

pub const STANDBY_CLEAR_COOLDOWN: Duration = Duration::from_secs(3_600);
pub const STANDBY_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const STANDBY_RAM_USAGE_PERCENT: f32 = 75.0;
pub const STANDBY_CACHED_PERCENT: f32 = 40.0;
