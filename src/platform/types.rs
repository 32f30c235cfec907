/*!
 * Platform Types
 * Values exchanged with a platform backend
 */

use crate::core::types::{AccessMask, Pid, ProcessName, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::traits::ProcessPlatform;

/// One enumerated process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub ppid: Pid,
    /// Lowercased executable name
    pub name: ProcessName,
    pub exe: Option<String>,
    pub user: Option<String>,
    pub session: SessionId,
    /// Owned by root or a service account
    pub system_account: bool,
}

impl ProcessEntry {
    pub fn new(pid: Pid, ppid: Pid, name: &str) -> Self {
        Self {
            pid,
            ppid,
            name: name.to_lowercase().into(),
            exe: None,
            user: None,
            session: 1,
            system_account: false,
        }
    }

    pub fn with_exe(mut self, exe: impl Into<String>) -> Self {
        self.exe = Some(exe.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn with_system_account(mut self, system: bool) -> Self {
        self.system_account = system;
        self
    }
}

/// Opaque OS handle value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub i64);

/// An open process handle
///
/// Only the handle cache creates these. The OS handle is closed when the
/// last owner drops it, so eviction from the cache is the single release point.
pub struct ProcessHandle {
    pid: Pid,
    access: AccessMask,
    raw: RawHandle,
    platform: Arc<dyn ProcessPlatform>,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: Pid,
        access: AccessMask,
        raw: RawHandle,
        platform: Arc<dyn ProcessPlatform>,
    ) -> Self {
        Self {
            pid,
            access,
            raw,
            platform,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn access(&self) -> AccessMask {
        self.access
    }

    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.raw
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("access", &self.access)
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(e) = self.platform.close_handle(self.pid, self.raw) {
            tracing::debug!(pid = self.pid, error = %e, "handle close failed");
        }
    }
}

/// Process-group CPU-rate container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: u64,
    pub name: String,
}

/// System-wide memory counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub total_bytes: u64,
    pub available_bytes: u64,
    /// Standby / page cache
    pub cached_bytes: u64,
}

impl MemoryStatus {
    pub fn usage_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        (used as f64 / self.total_bytes as f64 * 100.0) as f32
    }

    pub fn cached_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.cached_bytes as f64 / self.total_bytes as f64 * 100.0) as f32
    }
}
