use std::sync::Arc;

use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::plugin_system::instantiate::StaticInstantiator;
use crate::plugin_system::manager::DefaultPluginManager;
use crate::storage::config::LoaderConfig;

/// Main application struct driving its components through their lifecycle
#[derive(Debug)]
pub struct Application {
    config: LoaderConfig,
    initialized: bool,
    started: bool,
    plugin_manager: DefaultPluginManager,
    // Components in initialization order
    components: Vec<Arc<dyn KernelComponent>>,
}

impl Application {
    /// Application whose plugins without a compiled-in factory are served
    /// as content-only packages
    pub fn new(config: LoaderConfig) -> Result<Self> {
        Self::with_instantiator(config, StaticInstantiator::new().with_archive_fallback(true))
    }

    pub fn with_instantiator(config: LoaderConfig, instantiator: StaticInstantiator) -> Result<Self> {
        let plugin_manager = DefaultPluginManager::from_config(config.clone(), instantiator)?;
        Ok(Self::with_plugin_manager(config, plugin_manager))
    }

    pub fn with_plugin_manager(config: LoaderConfig, plugin_manager: DefaultPluginManager) -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, constants::APP_VERSION);
        let components: Vec<Arc<dyn KernelComponent>> = vec![Arc::new(plugin_manager.clone())];
        Self {
            config,
            initialized: false,
            started: false,
            plugin_manager,
            components,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Handle to the plugin manager; clones share one plugin session
    pub fn plugin_manager(&self) -> &DefaultPluginManager {
        &self.plugin_manager
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Initialize then start every component, in order
    pub async fn run(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::RunPreCheck,
                component_name: None,
                message: "Application already running".to_string(),
                source: None,
            });
        }

        if !self.initialized {
            self.initialize().await?;
        }
        self.start().await?;
        log::info!("Application started successfully.");
        Ok(())
    }

    pub async fn initialize(&mut self) -> Result<()> {
        log::info!("Initializing components...");
        for component in &self.components {
            log::debug!("Initializing component: {}", component.name());
            component
                .initialize()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Initialize, component.name(), e))?;
        }
        self.initialized = true;
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        for component in &self.components {
            log::debug!("Starting component: {}", component.name());
            component
                .start()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Start, component.name(), e))?;
        }
        self.started = true;
        Ok(())
    }

    /// Stop every component in reverse order. Every component is stopped even
    /// if one fails; the first failure is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        log::info!("Shutting down components...");
        let mut first_error = None;
        for component in self.components.iter().rev() {
            log::debug!("Stopping component: {}", component.name());
            if let Err(e) = component.stop().await {
                log::error!("Error stopping component {}: {}", component.name(), e);
                first_error.get_or_insert_with(|| lifecycle_error(KernelLifecyclePhase::Shutdown, component.name(), e));
            }
        }
        self.started = false;
        first_error.map_or(Ok(()), Err)
    }
}

fn lifecycle_error(phase: KernelLifecyclePhase, component: &str, source: Error) -> Error {
    Error::KernelLifecycleError {
        phase,
        component_name: Some(component.to_string()),
        message: source.to_string(),
        source: Some(Box::new(source)),
    }
}
