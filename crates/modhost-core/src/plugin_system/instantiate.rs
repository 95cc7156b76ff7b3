//! Turning validated candidates into live plugin objects.
//!
//! Code loading is not this crate's concern: a [`PluginInstantiator`] is
//! handed the ordered candidates and returns one plugin per candidate, or
//! fails the whole batch. [`StaticInstantiator`] maps plugin names to
//! factories compiled into the host.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::plugin_system::manifest::PluginCandidate;
use crate::plugin_system::resources::ResourceError;
use crate::plugin_system::traits::{Plugin, ResourceKind};
use crate::storage::{LocalStorageProvider, StorageProvider};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    #[error("No plugin implementation available for '{0}'")]
    MissingFactory(String),

    #[error("Expected {expected} plugin instances but got {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("Instance '{found}' does not match candidate '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("Failed to instantiate '{plugin}': {message}")]
    Failed { plugin: String, message: String },
}

/// Builds live plugins for an ordered candidate list, all or nothing
pub trait PluginInstantiator: Send + Sync {
    fn instantiate(&self, candidates: &[PluginCandidate]) -> Result<Vec<Arc<dyn Plugin>>, InstantiationError>;
}

/// Factory building one plugin from its candidate
pub type PluginFactory =
    Arc<dyn Fn(&PluginCandidate) -> Result<Arc<dyn Plugin>, InstantiationError> + Send + Sync>;

/// Instantiates plugins from factories registered by name (case-insensitive).
///
/// With the archive fallback enabled, candidates without a factory become
/// content-only [`ArchivePlugin`]s serving files from their package directory.
#[derive(Clone, Default)]
pub struct StaticInstantiator {
    factories: HashMap<String, PluginFactory>,
    archive_fallback: bool,
}

impl StaticInstantiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive_fallback(mut self, enabled: bool) -> Self {
        self.archive_fallback = enabled;
        self
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PluginCandidate) -> Result<Arc<dyn Plugin>, InstantiationError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Arc::new(factory));
    }

    /// Registers a plugin instance shared by every session
    pub fn register_instance(&mut self, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_lowercase();
        self.factories.insert(name, Arc::new(move |_: &PluginCandidate| Ok(Arc::clone(&plugin))));
    }
}

impl PluginInstantiator for StaticInstantiator {
    fn instantiate(&self, candidates: &[PluginCandidate]) -> Result<Vec<Arc<dyn Plugin>>, InstantiationError> {
        candidates
            .iter()
            .map(|candidate| match self.factories.get(&candidate.name().to_lowercase()) {
                Some(factory) => (**factory)(candidate),
                None if self.archive_fallback => Ok(Arc::new(ArchivePlugin::from_candidate(candidate)) as Arc<dyn Plugin>),
                None => Err(InstantiationError::MissingFactory(candidate.name().to_string())),
            })
            .collect()
    }
}

/// Serves files from a directory, mapping resource kinds to file extensions
#[derive(Debug, Clone)]
struct DirectoryResources {
    storage: LocalStorageProvider,
}

impl DirectoryResources {
    fn new(root: PathBuf) -> Self {
        Self {
            storage: LocalStorageProvider::new(root),
        }
    }

    fn relative(kind: ResourceKind, path: &str) -> Option<PathBuf> {
        let relative = PathBuf::from(kind.file_path(path));
        LocalStorageProvider::is_contained(&relative).then_some(relative)
    }

    fn has(&self, kind: ResourceKind, path: &str) -> bool {
        Self::relative(kind, path).is_some_and(|p| self.storage.is_file(&p))
    }

    fn read(&self, owner: &str, kind: ResourceKind, path: &str) -> Result<Vec<u8>, ResourceError> {
        let qualified = format!("{}/{}", owner, path);
        let relative = Self::relative(kind, path).ok_or_else(|| ResourceError::MissingResource(qualified.clone()))?;
        if !self.storage.is_file(&relative) {
            return Err(ResourceError::MissingResource(qualified));
        }
        self.storage.read_to_bytes(&relative).map_err(|e| ResourceError::Unreadable {
            name: qualified,
            message: e.to_string(),
        })
    }
}

/// Content-only plugin backed by its package directory
#[derive(Debug, Clone)]
pub struct ArchivePlugin {
    name: String,
    resources: Option<DirectoryResources>,
}

impl ArchivePlugin {
    pub fn from_candidate(candidate: &PluginCandidate) -> Self {
        Self {
            name: candidate.name().to_string(),
            resources: candidate.root.clone().map(DirectoryResources::new),
        }
    }
}

impl Plugin for ArchivePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_resource(&self, kind: ResourceKind, path: &str) -> bool {
        self.resources.as_ref().is_some_and(|r| r.has(kind, path))
    }

    fn read_resource(&self, kind: ResourceKind, path: &str) -> Result<Vec<u8>, ResourceError> {
        match &self.resources {
            Some(resources) => resources.read(&self.name, kind, path),
            None => Err(ResourceError::MissingResource(format!("{}/{}", self.name, path))),
        }
    }
}

/// The synthetic plugin that always loads first and owns host content
#[derive(Debug, Clone)]
pub struct HostPlugin {
    name: String,
    resources: Option<DirectoryResources>,
}

impl HostPlugin {
    pub fn new(name: &str, content_dir: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            resources: content_dir.map(DirectoryResources::new),
        }
    }
}

impl Plugin for HostPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_resource(&self, kind: ResourceKind, path: &str) -> bool {
        self.resources.as_ref().is_some_and(|r| r.has(kind, path))
    }

    fn read_resource(&self, kind: ResourceKind, path: &str) -> Result<Vec<u8>, ResourceError> {
        match &self.resources {
            Some(resources) => resources.read(&self.name, kind, path),
            None => Err(ResourceError::MissingResource(format!("{}/{}", self.name, path))),
        }
    }
}
