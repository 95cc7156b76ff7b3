use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::plugin_system::content::{ContentError, PluginContext, RecipeBuilder};
use crate::plugin_system::resources::ResourceError;

/// Result type returned by every plugin hook
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Error type for plugin hooks
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Panic in {phase}: {message}")]
    Panicked { phase: String, message: String },
}

impl PluginError {
    pub fn msg(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }
}

/// Ordered lifecycle steps a plugin goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Load,
    SetupContent,
    PostSetupContent,
    AddRecipes,
    Unload,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Load => "Load",
            LifecyclePhase::SetupContent => "SetupContent",
            LifecyclePhase::PostSetupContent => "PostSetupContent",
            LifecyclePhase::AddRecipes => "AddRecipes",
            LifecyclePhase::Unload => "Unload",
        };
        f.write_str(name)
    }
}

/// Optional hooks a plugin declares through [`Plugin::capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hook {
    PreUpdate,
    PostUpdate,
    AddRecipes,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::PreUpdate => "PreUpdate",
            Hook::PostUpdate => "PostUpdate",
            Hook::AddRecipes => "AddRecipes",
        };
        f.write_str(name)
    }
}

/// What a qualified resource name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    File,
    Texture,
    Sound,
}

impl ResourceKind {
    /// Maps a resource path to the file that stores it
    pub fn file_path(&self, path: &str) -> String {
        match self {
            ResourceKind::File => path.to_string(),
            ResourceKind::Texture => format!("{}.png", path),
            ResourceKind::Sound => format!("{}.wav", path),
        }
    }
}

/// Core trait that all plugins must implement.
///
/// Lifecycle hooks run on the loader's worker, one plugin at a time.
/// Runtime hooks are only dispatched to plugins listing them in
/// [`Plugin::capabilities`].
pub trait Plugin: Send + Sync {
    /// Internal name; must match the manifest name
    fn name(&self) -> &str;

    /// Optional hooks this plugin implements
    fn capabilities(&self) -> &[Hook] {
        &[]
    }

    /// Register content definitions and hot keys
    fn load(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Fill in properties of the plugin's own content
    fn setup_content(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Runs after this plugin's `setup_content`
    fn post_setup_content(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        Ok(())
    }

    fn add_recipes(&self, _recipes: &mut RecipeBuilder<'_>) -> PluginResult<()> {
        Ok(())
    }

    fn pre_update(&self) -> PluginResult<()> {
        Ok(())
    }

    fn post_update(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Teardown; errors are logged and never stop an unload
    fn unload(&self) -> PluginResult<()> {
        Ok(())
    }

    fn has_resource(&self, _kind: ResourceKind, _path: &str) -> bool {
        false
    }

    fn read_resource(&self, _kind: ResourceKind, path: &str) -> Result<Vec<u8>, ResourceError> {
        Err(ResourceError::MissingResource(format!("{}/{}", self.name(), path)))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic reason".to_string()
    }
}

/// Runs a hook, turning a panic into [`PluginError::Panicked`].
pub(crate) fn invoke_guarded<T>(phase: impl fmt::Display, hook: impl FnOnce() -> PluginResult<T>) -> PluginResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panicked {
            phase: phase.to_string(),
            message: panic_message(payload),
        }),
    }
}
