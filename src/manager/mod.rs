/*!
 * Manager Module
 * Orchestration of the optimizer components and the threads that drive them
 */

mod builder;
mod group;
mod maintenance;
mod runtime;
mod tasks;
mod unified;

// Re-export public API
pub use builder::ManagerBuilder;
pub use group::GroupReport;
pub use runtime::{OptimizerRuntime, RuntimeCommand};
pub use tasks::MaintenanceTask;
pub use unified::{ApplyOutcome, UnifiedProcessManager};
