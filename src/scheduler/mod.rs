/*!
 * Scheduler Module
 * Adaptive timer coalescing for periodic maintenance
 */

pub mod coalescer;
pub mod task;

// Re-export public API
pub use coalescer::{CoalescerStats, DueTask, TimerCoalescer};
pub use task::{CoalescedTask, TaskSpec};
