#![cfg(test)]

use std::sync::{Arc, Mutex};

use crate::plugin_system::content::{ContentKind, PluginContext, RecipeBuilder};
use crate::plugin_system::instantiate::StaticInstantiator;
use crate::plugin_system::loader::{PluginLoader, RawArchive, StaticArchiveSource};
use crate::plugin_system::manager::{host_api_version, DefaultPluginManager};
use crate::plugin_system::manifest::{ManifestBuilder, PluginManifest, RunMode};
use crate::plugin_system::progress::{ProgressEvent, ProgressSink};
use crate::plugin_system::traits::{Hook, LifecyclePhase, Plugin, PluginError, PluginResult};
use crate::storage::config::LoaderConfig;
use crate::storage::flags::MemoryFlagStore;

/// Shared log of every hook call, as `Name.Phase`
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, name: &str, phase: &str) {
        self.0.lock().unwrap().push(format!("{}.{}", name, phase));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Plugin names that ran `phase`, in call order
    pub fn calls(&self, phase: &str) -> Vec<String> {
        let suffix = format!(".{}", phase);
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Test plugin that journals its hooks and can be told to fail or panic
pub struct RecordingPlugin {
    name: String,
    journal: Journal,
    fail_in: Option<LifecyclePhase>,
    panic_in: Option<LifecyclePhase>,
    fail_update: bool,
    hooks: Vec<Hook>,
    items: Vec<String>,
}

impl RecordingPlugin {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_in: None,
            panic_in: None,
            fail_update: false,
            hooks: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn failing_in(mut self, phase: LifecyclePhase) -> Self {
        self.fail_in = Some(phase);
        self
    }

    pub fn panicking_in(mut self, phase: LifecyclePhase) -> Self {
        self.panic_in = Some(phase);
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn with_hooks(mut self, hooks: &[Hook]) -> Self {
        self.hooks = hooks.to_vec();
        self
    }

    /// Items registered on load; the first one gets a recipe if the plugin adds recipes
    pub fn with_items(mut self, items: &[&str]) -> Self {
        self.items = items.iter().map(|s| s.to_string()).collect();
        self
    }

    fn step(&self, phase: LifecyclePhase) -> PluginResult<()> {
        self.journal.record(&self.name, &phase.to_string());
        if self.panic_in == Some(phase) {
            panic!("{} blew up", self.name);
        }
        if self.fail_in == Some(phase) {
            return Err(PluginError::msg(format!("{} refused {}", self.name, phase)));
        }
        Ok(())
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Hook] {
        &self.hooks
    }

    fn load(&self, ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        self.step(LifecyclePhase::Load)?;
        for item in &self.items {
            ctx.register_content(ContentKind::Item, item)?;
        }
        Ok(())
    }

    fn setup_content(&self, ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        self.step(LifecyclePhase::SetupContent)?;
        for item in &self.items {
            let qualified = format!("{}/{}", self.name, item);
            if let Some(id) = ctx.find(ContentKind::Item, &qualified) {
                ctx.set_property(id, "configured", "true")?;
            }
        }
        Ok(())
    }

    fn post_setup_content(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        self.step(LifecyclePhase::PostSetupContent)
    }

    fn add_recipes(&self, recipes: &mut RecipeBuilder<'_>) -> PluginResult<()> {
        self.step(LifecyclePhase::AddRecipes)?;
        if let Some(first) = self.items.first() {
            let qualified = format!("{}/{}", self.name, first);
            if let Some(id) = recipes.item(&qualified) {
                recipes.add(id, 1, Vec::new())?;
            }
        }
        Ok(())
    }

    fn pre_update(&self) -> PluginResult<()> {
        self.journal.record(&self.name, "PreUpdate");
        if self.fail_update {
            return Err(PluginError::msg("update failed"));
        }
        Ok(())
    }

    fn post_update(&self) -> PluginResult<()> {
        self.journal.record(&self.name, "PostUpdate");
        Ok(())
    }

    fn unload(&self) -> PluginResult<()> {
        self.step(LifecyclePhase::Unload)
    }
}

/// Progress sink keeping every event
#[derive(Debug, Default)]
pub struct RecordingProgress(Mutex<Vec<ProgressEvent>>);

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// A manager over in-memory packages, one per plugin, in the given discovery order
pub struct TestHost {
    pub manager: DefaultPluginManager,
    pub flags: Arc<MemoryFlagStore>,
    pub progress: Arc<RecordingProgress>,
}

pub fn test_host(plugins: Vec<(PluginManifest, RecordingPlugin)>, run_mode: RunMode) -> TestHost {
    let mut source = StaticArchiveSource::default();
    let mut instantiator = StaticInstantiator::new();
    for (manifest, plugin) in plugins {
        let archive = RawArchive::from_manifest(manifest.name.to_lowercase(), &manifest)
            .expect("Failed to encode test manifest");
        source.push(archive);
        instantiator.register_instance(Arc::new(plugin));
    }

    let flags = Arc::new(MemoryFlagStore::new());
    let progress = Arc::new(RecordingProgress::default());
    let config = LoaderConfig {
        run_mode,
        ..LoaderConfig::default()
    };
    let loader = PluginLoader::new(
        Arc::new(source),
        flags.clone(),
        run_mode,
        host_api_version().expect("Host API version should parse"),
    );
    let manager = DefaultPluginManager::new(config, loader, Arc::new(instantiator))
        .expect("Failed to create plugin manager")
        .with_progress(progress.clone());

    TestHost { manager, flags, progress }
}

/// Plugin with no relationships
pub fn plain(name: &str, journal: &Journal) -> (PluginManifest, RecordingPlugin) {
    (ManifestBuilder::new(name, "1.0").build(), RecordingPlugin::new(name, journal))
}

/// Plugin with hard dependencies on `deps`
pub fn depending(name: &str, deps: &[&str], journal: &Journal) -> (PluginManifest, RecordingPlugin) {
    let mut builder = ManifestBuilder::new(name, "1.0");
    for dep in deps {
        builder = builder.dependency(dep, None);
    }
    (builder.build(), RecordingPlugin::new(name, journal))
}
