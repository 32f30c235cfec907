/*!
 * Optimizer Kernel Library
 * Foreground-driven process optimizer exposed as a library
 */

pub mod config;
pub mod core;
pub mod manager;
pub mod monitoring;
pub mod platform;
pub mod process;
pub mod scheduler;
pub mod topology;

// Re-exports
pub use config::{Module, OptimizerConfig};
pub use crate::core::errors::{ConfigError, OptimizerError, PlatformError, Result};
pub use manager::{ApplyOutcome, GroupReport, ManagerBuilder, OptimizerRuntime, UnifiedProcessManager};
pub use monitoring::{init_tracing, ManagerStatsSnapshot};
pub use platform::{select_platform, ProcessPlatform, SimulationPlatform};
pub use scheduler::TimerCoalescer;
pub use topology::HardwareTopology;
