//! # Kernel Errors
//!
//! [`Error`] is the crate-wide error type. Subsystem errors convert into it
//! with `?`, and [`Result`] is the matching alias.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::plugin_system::error::PluginSystemError;
use crate::storage::error::StorageSystemError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("RunPreCheck")]
    RunPreCheck,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    /// I/O error with the operation and path that failed
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::io(source, operation, path))
    }

    /// The plugin system error behind this error, if any
    pub fn as_plugin_system(&self) -> Option<&PluginSystemError> {
        match self {
            Error::PluginSystem(e) => Some(e),
            _ => None,
        }
    }
}
