//! `<owner>/<path>` resource lookups across loaded plugins.
//!
//! The owner is a loaded plugin's name or the host identifier. Names are
//! rejected before any plugin storage is touched when the qualifier is
//! missing or the owner is unknown.
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::plugin_system::manifest::RunMode;
use crate::plugin_system::traits::{Plugin, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Missing plugin qualifier in resource name '{0}'")]
    MissingQualifier(String),

    #[error("Missing plugin: {owner} (requested '{name}')")]
    MissingPlugin { owner: String, name: String },

    #[error("Missing resource: {0}")]
    MissingResource(String),

    #[error("Failed to read resource '{name}': {message}")]
    Unreadable { name: String, message: String },
}

/// Splits `owner/path` on the first separator.
pub fn split_qualified(name: &str) -> Result<(&str, &str), ResourceError> {
    match name.split_once('/') {
        Some((owner, path)) if !owner.is_empty() && !path.is_empty() => Ok((owner, path)),
        _ => Err(ResourceError::MissingQualifier(name.to_string())),
    }
}

/// Routes qualified names to the plugin that owns them.
///
/// A router is a snapshot of the plugin set that was active when it was
/// created.
#[derive(Clone)]
pub struct ResourceRouter {
    owners: HashMap<String, Arc<dyn Plugin>>,
    run_mode: RunMode,
}

impl ResourceRouter {
    pub fn new<'a>(run_mode: RunMode, plugins: impl IntoIterator<Item = &'a Arc<dyn Plugin>>) -> Self {
        let owners = plugins
            .into_iter()
            .map(|p| (p.name().to_lowercase(), Arc::clone(p)))
            .collect();
        Self { owners, run_mode }
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    fn owner_of<'n>(&self, name: &'n str) -> Result<(&Arc<dyn Plugin>, &'n str), ResourceError> {
        let (owner, path) = split_qualified(name)?;
        let plugin = self
            .owners
            .get(&owner.to_lowercase())
            .ok_or_else(|| ResourceError::MissingPlugin {
                owner: owner.to_string(),
                name: name.to_string(),
            })?;
        Ok((plugin, path))
    }

    fn read(&self, kind: ResourceKind, name: &str) -> Result<Vec<u8>, ResourceError> {
        let (plugin, path) = self.owner_of(name)?;
        if !plugin.has_resource(kind, path) {
            return Err(ResourceError::MissingResource(name.to_string()));
        }
        plugin.read_resource(kind, path)
    }

    fn exists(&self, kind: ResourceKind, name: &str) -> bool {
        match self.owner_of(name) {
            Ok((plugin, path)) => plugin.has_resource(kind, path),
            Err(_) => false,
        }
    }

    /// Raw bytes of a plugin file
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, ResourceError> {
        self.read(ResourceKind::File, name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.exists(ResourceKind::File, name)
    }

    /// Texture bytes, or `None` on a headless server
    pub fn texture(&self, name: &str) -> Result<Option<Vec<u8>>, ResourceError> {
        if self.run_mode == RunMode::Server {
            return Ok(None);
        }
        self.read(ResourceKind::Texture, name).map(Some)
    }

    pub fn texture_exists(&self, name: &str) -> bool {
        self.run_mode != RunMode::Server && self.exists(ResourceKind::Texture, name)
    }

    /// Sound bytes, or `None` on a headless server
    pub fn sound(&self, name: &str) -> Result<Option<Vec<u8>>, ResourceError> {
        if self.run_mode == RunMode::Server {
            return Ok(None);
        }
        self.read(ResourceKind::Sound, name).map(Some)
    }

    pub fn sound_exists(&self, name: &str) -> bool {
        self.run_mode != RunMode::Server && self.exists(ResourceKind::Sound, name)
    }
}
