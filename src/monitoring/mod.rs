/*!
 * Monitoring
 * Tracing setup and optimizer counters
 */

mod stats;
mod tracer;

pub use stats::{ManagerStats, ManagerStatsSnapshot};
pub use tracer::{generate_trace_id, init_tracing, OperationSpan, DEFAULT_SLOW_THRESHOLD};
