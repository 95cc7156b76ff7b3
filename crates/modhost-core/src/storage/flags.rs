use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::manifest::PluginIdentity;
use crate::storage::error::StorageSystemError;
use crate::storage::{LocalStorageProvider, StorageProvider};

/// One persistent enabled/disabled flag per plugin identity.
/// Plugins without a stored flag are enabled.
pub trait PluginFlagStore: Send + Sync + Debug {
    fn is_enabled(&self, identity: &PluginIdentity) -> bool;

    fn set_enabled(&self, identity: &PluginIdentity, enabled: bool) -> Result<()>;
}

/// Stores each flag in `<identity>.enabled` next to the plugin package.
#[derive(Debug, Clone)]
pub struct SidecarFlagStore {
    storage: LocalStorageProvider,
}

impl SidecarFlagStore {
    pub fn new(plugin_dir: PathBuf) -> Self {
        Self {
            storage: LocalStorageProvider::new(plugin_dir),
        }
    }

    fn flag_path(identity: &PluginIdentity) -> Result<PathBuf> {
        let path = PathBuf::from(format!("{}.{}", identity, constants::ENABLED_FLAG_EXTENSION));
        let plain = path.components().count() == 1 && LocalStorageProvider::is_contained(&path);
        if identity.as_str().is_empty() || !plain {
            return Err(StorageSystemError::InvalidPath {
                path,
                reason: "plugin identity must be a plain file name".to_string(),
            }
            .into());
        }
        Ok(path)
    }

    /// Location of the sidecar for an identity
    pub fn flag_file(&self, identity: &PluginIdentity) -> Option<PathBuf> {
        Self::flag_path(identity).ok().map(|p| self.storage.base_path().join(p))
    }

    fn read_flag(&self, path: &Path) -> Result<bool> {
        let text = self.storage.read_to_string(path)?;
        Ok(!text.trim().eq_ignore_ascii_case("false"))
    }
}

impl PluginFlagStore for SidecarFlagStore {
    fn is_enabled(&self, identity: &PluginIdentity) -> bool {
        let Ok(path) = Self::flag_path(identity) else {
            return true;
        };
        if !self.storage.is_file(&path) {
            return true;
        }
        match self.read_flag(&path) {
            Ok(enabled) => enabled,
            Err(e) => {
                log::warn!("Could not read enable flag for '{}', treating as enabled: {}", identity, e);
                true
            }
        }
    }

    fn set_enabled(&self, identity: &PluginIdentity, enabled: bool) -> Result<()> {
        let path = Self::flag_path(identity)?;
        let value = if enabled { "true" } else { "false" };
        self.storage.write_string(&path, value)?;
        log::info!("Plugin '{}' {}", identity, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}

/// In-memory flags for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<HashMap<PluginIdentity, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities currently disabled, sorted
    pub fn disabled(&self) -> Vec<PluginIdentity> {
        let flags = match self.flags.lock() {
            Ok(flags) => flags,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut disabled: Vec<PluginIdentity> = flags
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(id, _)| id.clone())
            .collect();
        disabled.sort();
        disabled
    }
}

impl PluginFlagStore for MemoryFlagStore {
    fn is_enabled(&self, identity: &PluginIdentity) -> bool {
        match self.flags.lock() {
            Ok(flags) => flags.get(identity).copied().unwrap_or(true),
            Err(poisoned) => poisoned.into_inner().get(identity).copied().unwrap_or(true),
        }
    }

    fn set_enabled(&self, identity: &PluginIdentity, enabled: bool) -> Result<()> {
        let mut flags = self
            .flags
            .lock()
            .map_err(|_| Error::Other("plugin flag store lock poisoned".to_string()))?;
        flags.insert(identity.clone(), enabled);
        Ok(())
    }
}
