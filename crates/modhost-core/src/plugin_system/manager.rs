use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;

use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::content::{ContentRegistry, PluginContext, RecipeBuilder};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::instantiate::{HostPlugin, InstantiationError, PluginInstantiator, StaticInstantiator};
use crate::plugin_system::loader::{DirectoryArchiveSource, DiscoveryOutcome, PluginLoader};
use crate::plugin_system::manifest::{same_name, PluginCandidate, PluginIdentity, RunMode};
use crate::plugin_system::progress::{LogProgressSink, ProgressEvent, ProgressPhase, ProgressSink};
use crate::plugin_system::registry::{LoadedPlugin, PluginRegistry};
use crate::plugin_system::resolver::DependencyResolver;
use crate::plugin_system::resources::ResourceRouter;
use crate::plugin_system::traits::{invoke_guarded, Hook, LifecyclePhase, Plugin, PluginError};
use crate::plugin_system::version::PluginVersion;
use crate::storage::config::LoaderConfig;
use crate::storage::flags::SidecarFlagStore;

/// Where the loader is in its session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderState {
    Idle,
    Discovering,
    Resolving,
    Instantiating,
    Loading,
    SettingUpContent,
    /// The only state in which plugin runtime behavior may be used
    Active,
    Unloading,
    /// A session failed; unload before loading again
    Errored,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderState::Idle => "idle",
            LoaderState::Discovering => "discovering",
            LoaderState::Resolving => "resolving",
            LoaderState::Instantiating => "instantiating",
            LoaderState::Loading => "loading",
            LoaderState::SettingUpContent => "setting up content",
            LoaderState::Active => "active",
            LoaderState::Unloading => "unloading",
            LoaderState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful load session
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Plugin names in load order, host first
    pub order: Vec<String>,
    pub discovery: DiscoveryOutcome,
}

/// Plugin system component interface
#[async_trait]
pub trait PluginManager: KernelComponent {
    /// Discover, resolve, instantiate and activate plugins. Requires `Idle`.
    async fn load(&self) -> Result<LoadReport>;

    /// Tear down the current plugin set and return to `Idle`
    async fn unload(&self) -> Result<()>;

    /// Unload followed by load, as one session
    async fn reload(&self) -> Result<LoadReport>;

    fn state(&self) -> LoaderState;

    /// Get a plugin by name (case-insensitive)
    async fn get_plugin(&self, name: &str) -> Option<LoadedPlugin>;

    /// Get all plugins in load order, host first
    async fn loaded_plugins(&self) -> Vec<LoadedPlugin>;

    async fn enable_plugin(&self, identity: &PluginIdentity) -> Result<()>;

    async fn disable_plugin(&self, identity: &PluginIdentity) -> Result<()>;

    async fn is_plugin_enabled(&self, identity: &PluginIdentity) -> bool;

    /// Router over the active plugin set
    async fn resource_router(&self) -> Result<ResourceRouter>;

    /// Run a runtime hook on every implementer, in load order.
    /// Returns the failures; they are logged and never unload anything.
    async fn dispatch(&self, hook: Hook) -> Result<Vec<(String, PluginError)>>;
}

/// Default implementation of plugin manager
#[derive(Clone)]
pub struct DefaultPluginManager {
    name: &'static str,
    config: Arc<LoaderConfig>,
    loader: PluginLoader,
    instantiator: Arc<dyn PluginInstantiator>,
    progress: Arc<dyn ProgressSink>,
    host: Arc<dyn Plugin>,
    host_version: PluginVersion,
    registry: Arc<RwLock<PluginRegistry>>,
    // Held for the whole of a load, reload or unload
    session: Arc<Mutex<()>>,
    state: Arc<watch::Sender<LoaderState>>,
    last_error: Arc<std::sync::Mutex<Option<String>>>,
}

/// Host API version plugins are checked against
pub fn host_api_version() -> Result<semver::Version> {
    semver::Version::parse(constants::API_VERSION)
        .map_err(|e| Error::Other(format!("Invalid API_VERSION constant '{}': {}", constants::API_VERSION, e)))
}

impl DefaultPluginManager {
    pub fn new(config: LoaderConfig, loader: PluginLoader, instantiator: Arc<dyn PluginInstantiator>) -> Result<Self> {
        let host_version = PluginVersion::parse(constants::APP_VERSION)
            .map_err(|e| Error::Other(format!("Invalid APP_VERSION constant: {}", e)))?;
        let host: Arc<dyn Plugin> = Arc::new(HostPlugin::new(&config.host_name, config.host_content_dir.clone()));
        let (state, _) = watch::channel(LoaderState::Idle);

        Ok(Self {
            name: "DefaultPluginManager",
            registry: Arc::new(RwLock::new(PluginRegistry::new(config.vanilla_content))),
            config: Arc::new(config),
            loader,
            instantiator,
            progress: Arc::new(LogProgressSink),
            host,
            host_version,
            session: Arc::new(Mutex::new(())),
            state: Arc::new(state),
            last_error: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    /// Manager reading plugin packages and their sidecar flags from `config.plugin_dir`
    pub fn from_config(config: LoaderConfig, instantiator: StaticInstantiator) -> Result<Self> {
        let source = Arc::new(DirectoryArchiveSource::new(config.plugin_dir.clone()));
        let flags = Arc::new(SidecarFlagStore::new(config.plugin_dir.clone()));
        let loader = PluginLoader::new(source, flags, config.run_mode, host_api_version()?);
        Self::new(config, loader, Arc::new(instantiator))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the host pseudo-plugin, e.g. to give the host its own hooks
    pub fn with_host_plugin(mut self, host: Arc<dyn Plugin>) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<LoaderState> {
        self.state.subscribe()
    }

    /// Human-readable report of the most recent failed session
    pub fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Read access to the runtime set and its tables
    pub async fn inspect<R>(&self, f: impl FnOnce(&PluginRegistry) -> R) -> R {
        let registry = self.registry.read().await;
        f(&registry)
    }

    /// Read access to the content tables
    pub async fn content<R>(&self, f: impl FnOnce(&ContentRegistry) -> R) -> R {
        let registry = self.registry.read().await;
        f(registry.content())
    }

    /// Network id of a plugin, assigned in load order on servers
    pub async fn network_id(&self, name: &str) -> Option<u16> {
        self.registry.read().await.network_id(name)
    }

    pub async fn plugin_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.registry.read().await.contains(name)
    }

    /// Names in reverse load order, host last
    pub async fn loaded_names_newest_first(&self) -> Vec<String> {
        let mut names = self.registry.read().await.names();
        names.reverse();
        names
    }

    /// Plugins declaring `hook`, in load order
    pub async fn hook_implementers(&self, hook: Hook) -> Vec<LoadedPlugin> {
        self.registry.read().await.hook_implementers(hook)
    }

    /// Run a load session on the runtime, off the caller's task
    pub fn spawn_load(&self) -> JoinHandle<Result<LoadReport>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.load().await })
    }

    pub fn spawn_reload(&self) -> JoinHandle<Result<LoadReport>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.reload().await })
    }

    pub fn spawn_unload(&self) -> JoinHandle<Result<()>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.unload().await })
    }

    fn set_state(&self, next: LoaderState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::debug!("Plugin loader state: {} -> {}", previous, next);
        }
    }

    fn report(&self, phase: ProgressPhase, current: usize, total: usize, label: &str) {
        self.progress.report(ProgressEvent::new(phase, current, total, label));
    }

    fn record_error(&self, message: Option<String>) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = message,
            Err(poisoned) => *poisoned.into_inner() = message,
        }
    }

    /// Enter `Errored` and keep the report
    fn fail(&self, error: Error) -> Error {
        log::error!("Plugin load failed: {}", error);
        self.record_error(Some(error.to_string()));
        self.set_state(LoaderState::Errored);
        error
    }

    fn disable_candidate(&self, identity: &PluginIdentity, name: &str) {
        match self.loader.flags().set_enabled(identity, false) {
            Ok(()) => log::warn!("Disabled plugin '{}' ({})", name, identity),
            Err(e) => log::error!("Failed to disable plugin '{}' ({}): {}", name, identity, e),
        }
    }

    async fn instantiate(&self, order: &[PluginCandidate]) -> std::result::Result<Vec<Arc<dyn Plugin>>, InstantiationError> {
        let instantiator = Arc::clone(&self.instantiator);
        let batch = order.to_vec();
        let instances = tokio::task::spawn_blocking(move || instantiator.instantiate(&batch))
            .await
            .map_err(|e| InstantiationError::Failed {
                plugin: "<batch>".to_string(),
                message: e.to_string(),
            })??;

        if instances.len() != order.len() {
            return Err(InstantiationError::CountMismatch {
                expected: order.len(),
                found: instances.len(),
            });
        }
        for (instance, candidate) in instances.iter().zip(order) {
            if !same_name(instance.name(), candidate.name()) {
                return Err(InstantiationError::NameMismatch {
                    expected: candidate.name().to_string(),
                    found: instance.name().to_string(),
                });
            }
        }
        Ok(instances)
    }

    /// Blame `loaded` for a hook failure, disabling it unless it is the host
    fn phase_failure(&self, loaded: &LoadedPlugin, phase: LifecyclePhase, source: PluginError) -> PluginSystemError {
        if let Some(identity) = loaded.identity() {
            self.disable_candidate(identity, loaded.name());
        }
        PluginSystemError::PhaseExecution {
            plugin: loaded.name().to_string(),
            version: loaded.version(),
            phase,
            source,
        }
    }

    fn run_load_phase(&self, registry: &mut PluginRegistry) -> std::result::Result<(), PluginSystemError> {
        let plugins = registry.plugins().to_vec();
        let total = plugins.len();
        let run_mode = self.config.run_mode;

        for (i, loaded) in plugins.iter().enumerate() {
            registry.mark_activated(i);
            let (content, hot_keys, _) = registry.tables_mut();
            let mut ctx = PluginContext::new(loaded.name(), LifecyclePhase::Load, run_mode, content, hot_keys);
            invoke_guarded(LifecyclePhase::Load, || loaded.plugin().load(&mut ctx))
                .map_err(|e| self.phase_failure(loaded, LifecyclePhase::Load, e))?;
            self.report(ProgressPhase::Loading, i + 1, total, loaded.name());
        }
        Ok(())
    }

    fn run_setup_phase(&self, registry: &mut PluginRegistry) -> std::result::Result<(), PluginSystemError> {
        let plugins = registry.plugins().to_vec();
        let total = plugins.len();
        let run_mode = self.config.run_mode;

        for (i, loaded) in plugins.iter().enumerate() {
            for phase in [LifecyclePhase::SetupContent, LifecyclePhase::PostSetupContent] {
                let (content, hot_keys, _) = registry.tables_mut();
                let mut ctx = PluginContext::new(loaded.name(), phase, run_mode, content, hot_keys);
                let plugin = loaded.plugin();
                invoke_guarded(phase, || match phase {
                    LifecyclePhase::SetupContent => plugin.setup_content(&mut ctx),
                    _ => plugin.post_setup_content(&mut ctx),
                })
                .map_err(|e| self.phase_failure(loaded, phase, e))?;
            }
            self.report(ProgressPhase::SettingUpContent, i + 1, total, loaded.name());
        }
        Ok(())
    }

    /// Recipe failures end the session but do not disable the plugin
    fn rebuild_recipes(&self, registry: &mut PluginRegistry) -> std::result::Result<(), PluginSystemError> {
        let implementers = registry.hook_implementers(Hook::AddRecipes);
        let total = implementers.len();
        let (_, _, recipes) = registry.tables_mut();
        recipes.clear();

        for (i, loaded) in implementers.iter().enumerate() {
            let (content, _, recipes) = registry.tables_mut();
            let mut builder = RecipeBuilder::new(loaded.name(), content, recipes);
            invoke_guarded(LifecyclePhase::AddRecipes, || loaded.plugin().add_recipes(&mut builder)).map_err(
                |source| PluginSystemError::Recipes {
                    plugin: loaded.name().to_string(),
                    source,
                },
            )?;
            self.report(ProgressPhase::AddingRecipes, i + 1, total, loaded.name());
        }
        Ok(())
    }

    /// Runs every lifecycle hook of a freshly installed set, in load order.
    /// Called on a blocking worker; the registry stays locked throughout.
    fn activate(&self, mut registry: OwnedRwLockWriteGuard<PluginRegistry>) -> std::result::Result<Vec<String>, PluginSystemError> {
        self.set_state(LoaderState::Loading);
        self.run_load_phase(&mut registry)?;

        let (content, _, _) = registry.tables_mut();
        content.seal();

        self.set_state(LoaderState::SettingUpContent);
        self.run_setup_phase(&mut registry)?;

        registry.build_hook_table();
        if self.config.run_mode == RunMode::Server {
            registry.assign_network_ids()?;
        }
        self.rebuild_recipes(&mut registry)?;
        Ok(registry.names())
    }

    /// Unload hooks, newest first. Returns how many plugins were torn down.
    fn teardown(&self, mut registry: OwnedRwLockWriteGuard<PluginRegistry>) -> usize {
        let teardown = registry.activated_newest_first();
        let total = teardown.len();

        for (i, loaded) in teardown.iter().enumerate() {
            if let Err(e) = invoke_guarded(LifecyclePhase::Unload, || loaded.plugin().unload()) {
                log::error!("Plugin '{}' failed to unload: {}", loaded.name(), e);
            }
            self.report(ProgressPhase::Unloading, i + 1, total, loaded.name());
        }

        registry.clear();
        total
    }

    async fn load_session(&self) -> Result<LoadReport> {
        let state = self.state();
        if state != LoaderState::Idle {
            return Err(PluginSystemError::InvalidState {
                operation: "load plugins",
                expected: "idle",
                actual: state,
            }
            .into());
        }
        self.record_error(None);
        log::info!("Loading plugins from {}", self.config.plugin_dir.display());

        self.set_state(LoaderState::Discovering);
        self.report(ProgressPhase::Finding, 0, 0, "");
        let discovery = match self.loader.discover().await {
            Ok(discovery) => discovery,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(LoaderState::Resolving);
        self.report(ProgressPhase::Resolving, 0, discovery.candidates.len(), "");
        let resolver = DependencyResolver::new(self.config.resolve_context());
        let order = match resolver.resolve(&discovery.candidates) {
            Ok(order) => order,
            Err(failure) => {
                for candidate in &failure.errored {
                    self.disable_candidate(&candidate.identity, candidate.name());
                }
                return Err(self.fail(PluginSystemError::Resolution(failure).into()));
            }
        };

        self.set_state(LoaderState::Instantiating);
        self.report(ProgressPhase::Instantiating, 0, order.len(), "");
        let instances = match self.instantiate(&order).await {
            Ok(instances) => instances,
            Err(e) => return Err(self.fail(PluginSystemError::Instantiation(e).into())),
        };

        let mut plugins = Vec::with_capacity(instances.len() + 1);
        plugins.push(LoadedPlugin::host(Arc::clone(&self.host), self.host_version));
        plugins.extend(
            instances
                .into_iter()
                .zip(order)
                .map(|(plugin, candidate)| LoadedPlugin::from_package(plugin, candidate.identity, candidate.manifest)),
        );

        let mut registry = Arc::clone(&self.registry).write_owned().await;
        registry.clear();
        if let Err(name) = registry.install(plugins) {
            let error = InstantiationError::Failed {
                plugin: name,
                message: "another plugin already uses this name".to_string(),
            };
            return Err(self.fail(PluginSystemError::Instantiation(error).into()));
        }

        // Plugin hooks are synchronous and may be slow; keep them off the runtime
        let manager = self.clone();
        let activated = tokio::task::spawn_blocking(move || manager.activate(registry)).await;
        let order = match activated {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(e) => return Err(self.fail(Error::Other(format!("Plugin session worker failed: {}", e)))),
        };

        let report = LoadReport { order, discovery };
        self.set_state(LoaderState::Active);
        log::info!("Loaded {} plugins: {}", report.order.len() - 1, report.order.join(", "));
        Ok(report)
    }

    async fn unload_session(&self) -> Result<()> {
        let state = self.state();
        if !matches!(state, LoaderState::Idle | LoaderState::Active | LoaderState::Errored) {
            return Err(PluginSystemError::InvalidState {
                operation: "unload plugins",
                expected: "idle, active or errored",
                actual: state,
            }
            .into());
        }

        self.set_state(LoaderState::Unloading);
        let registry = Arc::clone(&self.registry).write_owned().await;
        let manager = self.clone();
        let total = match tokio::task::spawn_blocking(move || manager.teardown(registry)).await {
            Ok(total) => total,
            Err(e) => {
                log::error!("Plugin teardown worker failed: {}", e);
                self.registry.write().await.clear();
                0
            }
        };

        self.set_state(LoaderState::Idle);
        if total > 0 {
            log::info!("Unloaded {} plugins", total);
        }
        Ok(())
    }

    fn require_active(&self) -> std::result::Result<(), PluginSystemError> {
        match self.state() {
            LoaderState::Active => Ok(()),
            other => Err(PluginSystemError::NotActive(other)),
        }
    }
}

impl Debug for DefaultPluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultPluginManager")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for DefaultPluginManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        log::info!(
            "Plugin manager ready (plugin dir {}, run mode {})",
            self.config.plugin_dir.display(),
            self.config.run_mode
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.load().await.map(|_| ())
    }

    async fn stop(&self) -> Result<()> {
        self.unload().await
    }
}

#[async_trait]
impl PluginManager for DefaultPluginManager {
    async fn load(&self) -> Result<LoadReport> {
        let _session = self.session.try_lock().map_err(|_| PluginSystemError::SessionInProgress)?;
        self.load_session().await
    }

    async fn unload(&self) -> Result<()> {
        let _session = self.session.try_lock().map_err(|_| PluginSystemError::SessionInProgress)?;
        self.unload_session().await
    }

    async fn reload(&self) -> Result<LoadReport> {
        let _session = self.session.try_lock().map_err(|_| PluginSystemError::SessionInProgress)?;
        self.unload_session().await?;
        self.load_session().await
    }

    fn state(&self) -> LoaderState {
        *self.state.borrow()
    }

    async fn get_plugin(&self, name: &str) -> Option<LoadedPlugin> {
        self.registry.read().await.get(name).cloned()
    }

    async fn loaded_plugins(&self) -> Vec<LoadedPlugin> {
        self.registry.read().await.plugins().to_vec()
    }

    async fn enable_plugin(&self, identity: &PluginIdentity) -> Result<()> {
        self.loader.flags().set_enabled(identity, true)
    }

    async fn disable_plugin(&self, identity: &PluginIdentity) -> Result<()> {
        self.loader.flags().set_enabled(identity, false)
    }

    async fn is_plugin_enabled(&self, identity: &PluginIdentity) -> bool {
        self.loader.flags().is_enabled(identity)
    }

    async fn resource_router(&self) -> Result<ResourceRouter> {
        self.require_active()?;
        let registry = self.registry.read().await;
        Ok(ResourceRouter::new(
            self.config.run_mode,
            registry.plugins().iter().map(|p| p.plugin()),
        ))
    }

    async fn dispatch(&self, hook: Hook) -> Result<Vec<(String, PluginError)>> {
        self.require_active()?;
        if hook == Hook::AddRecipes {
            return Err(PluginSystemError::UnsupportedDispatch(hook).into());
        }

        let implementers = self.registry.read().await.hook_implementers(hook);
        let mut failures = Vec::new();
        for loaded in implementers {
            let plugin = loaded.plugin();
            let result = invoke_guarded(hook, || match hook {
                Hook::PreUpdate => plugin.pre_update(),
                _ => plugin.post_update(),
            });
            if let Err(e) = result {
                log::error!("Plugin '{}' failed in {}: {}", loaded.name(), hook, e);
                failures.push((loaded.name().to_string(), e));
            }
        }
        Ok(failures)
    }
}
