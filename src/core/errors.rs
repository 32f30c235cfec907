/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::Pid;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a platform backend for a single OS call
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum PlatformError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(platform::not_found),
        help("The process may have terminated between enumeration and the call.")
    )]
    NotFound(Pid),

    #[error("Access denied for process {pid}: {operation}")]
    #[diagnostic(
        code(platform::access_denied),
        help("The optimizer lacks the privileges to change this process. Run with elevated rights or skip it.")
    )]
    AccessDenied { pid: Pid, operation: String },

    #[error("Invalid handle for process {0}")]
    #[diagnostic(
        code(platform::invalid_handle),
        help("The cached handle outlived its process. It will be reopened on the next cycle.")
    )]
    InvalidHandle(Pid),

    #[error("Not supported on this platform: {0}")]
    #[diagnostic(
        code(platform::unsupported),
        help("This knob has no equivalent on the running platform and is skipped.")
    )]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(platform::invalid_argument))]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(platform::io),
        help("A procfs, sysfs or cgroup file could not be read or written.")
    )]
    Io(String),
}

impl PlatformError {
    /// Process died, access denied or stale handle: skip this cycle, retry next one
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::NotFound(_)
                | PlatformError::AccessDenied { .. }
                | PlatformError::InvalidHandle(_)
        )
    }

    pub fn access_denied(pid: Pid, operation: impl Into<String>) -> Self {
        PlatformError::AccessDenied {
            pid,
            operation: operation.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        PlatformError::Unsupported(operation.into())
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Io(err.to_string())
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {reason}")]
    #[diagnostic(
        code(config::io),
        help("Check that the file exists and is readable, or unset OPTIMIZER_CONFIG to use defaults.")
    )]
    Io { path: String, reason: String },

    #[error("Malformed configuration: {0}")]
    #[diagnostic(
        code(config::parse),
        help("The configuration must be a JSON object. See optimizer.example.json in the repository root.")
    )]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(config::invalid))]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Unified optimizer error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum OptimizerError {
    #[error("Platform error: {0}")]
    #[diagnostic(transparent)]
    Platform(#[from] PlatformError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid pid: {0}")]
    #[diagnostic(
        code(optimizer::invalid_pid),
        help("Pid 0 is reserved and never names an optimizable process.")
    )]
    InvalidPid(Pid),

    #[error("Unknown module: {0}")]
    #[diagnostic(
        code(optimizer::unknown_module),
        help("Valid modules are: settings, groups, jobs, tuning, trim, suspension, memory.")
    )]
    UnknownModule(String),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(optimizer::internal_error),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl From<std::io::Error> for OptimizerError {
    fn from(err: std::io::Error) -> Self {
        OptimizerError::Platform(PlatformError::from(err))
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Result type for a single platform call
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Reject pid 0 at API boundaries
#[inline]
pub fn ensure_valid_pid(pid: Pid) -> Result<Pid> {
    if pid == 0 {
        Err(OptimizerError::InvalidPid(pid))
    } else {
        Ok(pid)
    }
}
