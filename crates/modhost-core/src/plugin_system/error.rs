//! # Plugin System Errors
//!
//! [`PluginSystemError`] is what a load, reload or unload session reports.
//! Resolver problems arrive as one aggregated [`ResolutionFailure`]; a failing
//! hook names the plugin, its version and the phase it was in.
use crate::plugin_system::instantiate::InstantiationError;
use crate::plugin_system::manager::LoaderState;
use crate::plugin_system::resolver::ResolutionFailure;
use crate::plugin_system::resources::ResourceError;
use crate::plugin_system::traits::{Hook, LifecyclePhase, PluginError};
use crate::plugin_system::version::PluginVersion;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Plugin dependency resolution failed:\n{0}")]
    Resolution(#[from] ResolutionFailure),

    #[error("Plugin instantiation failed: {0}")]
    Instantiation(#[from] InstantiationError),

    #[error("Plugin '{plugin}' v{version} failed during {phase}: {source}")]
    PhaseExecution {
        plugin: String,
        version: PluginVersion,
        phase: LifecyclePhase,
        #[source]
        source: PluginError,
    },

    #[error("Plugin '{plugin}' failed to add recipes: {source}")]
    Recipes {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("A plugin load session is already in progress")]
    SessionInProgress,

    #[error("Cannot {operation} while the loader is {actual}; expected {expected}")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        actual: LoaderState,
    },

    #[error("Plugins are not active (loader is {0})")]
    NotActive(LoaderState),

    #[error("Hook {0} cannot be dispatched at runtime")]
    UnsupportedDispatch(Hook),

    #[error("Cannot assign a network id to plugin #{index}; at most {max} plugins fit", max = u16::MAX as usize + 1)]
    NetworkIdOverflow { index: usize },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl PluginSystemError {
    /// The plugin blamed for a lifecycle failure, if any
    pub fn failed_plugin(&self) -> Option<&str> {
        match self {
            PluginSystemError::PhaseExecution { plugin, .. } | PluginSystemError::Recipes { plugin, .. } => {
                Some(plugin)
            }
            _ => None,
        }
    }
}
