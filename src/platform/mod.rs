/*!
 * Platform Abstraction
 * OS backends behind a single actuation trait
 */

#[cfg(target_os = "linux")]
pub mod linux;
pub mod simulation;
pub mod traits;
pub mod types;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;
pub use simulation::{PlatformCall, SimProcess, SimulationPlatform};
pub use traits::ProcessPlatform;
pub use types::{JobHandle, MemoryStatus, ProcessEntry, ProcessHandle, RawHandle};

use std::sync::Arc;
use tracing::info;

/// Select the best available backend for the current host
pub fn select_platform() -> Arc<dyn ProcessPlatform> {
    #[cfg(target_os = "linux")]
    {
        let linux = LinuxPlatform::new();
        if linux.is_supported() {
            return Arc::new(linux);
        }
    }

    info!("No native process backend available, falling back to simulation");
    Arc::new(SimulationPlatform::new())
}
