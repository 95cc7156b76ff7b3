use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::plugin_system::content::{ContentRegistry, HotKeyRegistry, RecipeTable, VanillaContent};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::{PluginIdentity, PluginManifest};
use crate::plugin_system::traits::{Hook, Plugin};
use crate::plugin_system::version::PluginVersion;

/// A live plugin and what the loader knows about it
#[derive(Clone)]
pub struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    version: PluginVersion,
    identity: Option<PluginIdentity>,
    manifest: Option<PluginManifest>,
}

impl LoadedPlugin {
    /// The host pseudo-plugin: no package, no manifest
    pub fn host(plugin: Arc<dyn Plugin>, version: PluginVersion) -> Self {
        Self {
            plugin,
            version,
            identity: None,
            manifest: None,
        }
    }

    pub fn from_package(plugin: Arc<dyn Plugin>, identity: PluginIdentity, manifest: PluginManifest) -> Self {
        Self {
            plugin,
            version: manifest.version,
            identity: Some(identity),
            manifest: Some(manifest),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn version(&self) -> PluginVersion {
        self.version
    }

    pub fn identity(&self) -> Option<&PluginIdentity> {
        self.identity.as_ref()
    }

    pub fn manifest(&self) -> Option<&PluginManifest> {
        self.manifest.as_ref()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn is_host(&self) -> bool {
        self.identity.is_none()
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name())
            .field("version", &self.version)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// The runtime plugin set of one session and every table it owns.
///
/// Plugins are stored in load order with the host at index 0. Names are
/// unique case-insensitively.
#[derive(Debug)]
pub struct PluginRegistry {
    plugins: Vec<LoadedPlugin>,
    by_name: HashMap<String, usize>,
    /// Indices whose `load` hook has been invoked, in activation order
    activated: Vec<usize>,
    hooks: BTreeMap<Hook, Vec<usize>>,
    network_ids: HashMap<String, u16>,
    content: ContentRegistry,
    hot_keys: HotKeyRegistry,
    recipes: RecipeTable,
}

impl PluginRegistry {
    pub fn new(vanilla: VanillaContent) -> Self {
        Self {
            plugins: Vec::new(),
            by_name: HashMap::new(),
            activated: Vec::new(),
            hooks: BTreeMap::new(),
            network_ids: HashMap::new(),
            content: ContentRegistry::new(vanilla),
            hot_keys: HotKeyRegistry::new(),
            recipes: RecipeTable::new(),
        }
    }

    /// Replace the plugin set. Fails on a case-insensitive name clash,
    /// leaving the registry unchanged.
    pub fn install(&mut self, plugins: Vec<LoadedPlugin>) -> Result<(), String> {
        let mut by_name = HashMap::with_capacity(plugins.len());
        for (i, plugin) in plugins.iter().enumerate() {
            if by_name.insert(plugin.name().to_lowercase(), i).is_some() {
                return Err(plugin.name().to_string());
            }
        }
        self.plugins = plugins;
        self.by_name = by_name;
        self.activated.clear();
        self.hooks.clear();
        self.network_ids.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins in load order, host first
    pub fn plugins(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    pub fn get(&self, name: &str) -> Option<&LoadedPlugin> {
        self.by_name.get(&name.to_lowercase()).map(|&i| &self.plugins[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub(crate) fn mark_activated(&mut self, index: usize) {
        self.activated.push(index);
    }

    /// Plugins whose `load` hook ran, newest first
    pub fn activated_newest_first(&self) -> Vec<LoadedPlugin> {
        self.activated.iter().rev().map(|&i| self.plugins[i].clone()).collect()
    }

    /// Build the per-hook implementer lists from declared capabilities, in load order
    pub fn build_hook_table(&mut self) {
        self.hooks.clear();
        for (i, loaded) in self.plugins.iter().enumerate() {
            for hook in loaded.plugin().capabilities() {
                let implementers = self.hooks.entry(*hook).or_default();
                if !implementers.contains(&i) {
                    implementers.push(i);
                }
            }
        }
    }

    pub fn hook_implementers(&self, hook: Hook) -> Vec<LoadedPlugin> {
        self.hooks
            .get(&hook)
            .map(|indices| indices.iter().map(|&i| self.plugins[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Number each plugin in load order; the host gets 0
    pub fn assign_network_ids(&mut self) -> Result<(), PluginSystemError> {
        self.network_ids = self
            .plugins
            .iter()
            .enumerate()
            .map(|(i, p)| network_id_for(i).map(|id| (p.name().to_lowercase(), id)))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    pub fn network_id(&self, name: &str) -> Option<u16> {
        self.network_ids.get(&name.to_lowercase()).copied()
    }

    pub fn content(&self) -> &ContentRegistry {
        &self.content
    }

    pub fn hot_keys(&self) -> &HotKeyRegistry {
        &self.hot_keys
    }

    pub fn recipes(&self) -> &RecipeTable {
        &self.recipes
    }

    /// Mutable access to the tables a hook context needs
    pub(crate) fn tables_mut(&mut self) -> (&mut ContentRegistry, &mut HotKeyRegistry, &mut RecipeTable) {
        (&mut self.content, &mut self.hot_keys, &mut self.recipes)
    }

    /// Drop every plugin and reset all tables
    pub fn clear(&mut self) {
        self.plugins.clear();
        self.by_name.clear();
        self.activated.clear();
        self.hooks.clear();
        self.network_ids.clear();
        self.content.clear();
        self.hot_keys.clear();
        self.recipes.clear();
    }
}

/// Network id of the plugin at `index` in load order
pub(crate) fn network_id_for(index: usize) -> Result<u16, PluginSystemError> {
    u16::try_from(index).map_err(|_| PluginSystemError::NetworkIdOverflow { index })
}
