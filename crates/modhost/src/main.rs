mod cli;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use tracing_subscriber::EnvFilter;

use modhost_core::kernel::bootstrap::Application;
use modhost_core::kernel::constants;
use modhost_core::kernel::error::{Error as KernelError, Result};
use modhost_core::plugin_system::{
    DefaultPluginManager, DependencyResolver, PluginIdentity, PluginManager, PluginSystemError, StaticInstantiator,
};
use modhost_core::storage::LoaderConfig;

use cli::{CliArgs, Commands};

fn init_logging() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
        return;
    }
    // Route the core crate's `log` records into tracing
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = args.loader_config()?;
    info!(
        "{} v{} ({} mode, plugins in {})",
        constants::APP_NAME,
        constants::APP_VERSION,
        config.run_mode,
        config.plugin_dir.display()
    );

    match args.command {
        Commands::List => list(config).await,
        Commands::Resolve => resolve(config).await,
        Commands::Load => load(config).await,
        Commands::Enable { identity } => set_enabled(config, &identity, true).await,
        Commands::Disable { identity } => set_enabled(config, &identity, false).await,
        Commands::Read { name } => read(config, &name).await,
    }
}

fn manager_for(config: LoaderConfig) -> Result<DefaultPluginManager> {
    DefaultPluginManager::from_config(config, StaticInstantiator::new().with_archive_fallback(true))
}

async fn list(config: LoaderConfig) -> Result<()> {
    let manager = manager_for(config)?;
    let outcome = manager.loader().discover().await?;

    if outcome.all_parsed().next().is_none() && outcome.rejected.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }
    for candidate in &outcome.candidates {
        println!("{} v{} ({}) enabled", candidate.name(), candidate.manifest.version, candidate.identity);
    }
    for candidate in &outcome.disabled {
        println!("{} v{} ({}) disabled", candidate.name(), candidate.manifest.version, candidate.identity);
    }
    for candidate in &outcome.other_side {
        println!(
            "{} v{} ({}) skipped in {} mode",
            candidate.name(),
            candidate.manifest.version,
            candidate.identity,
            manager.loader().run_mode()
        );
    }
    for rejected in &outcome.rejected {
        println!("{} invalid: {}", rejected.identity, rejected.error);
    }
    Ok(())
}

async fn resolve(config: LoaderConfig) -> Result<()> {
    let resolver = DependencyResolver::new(config.resolve_context());
    let host_name = config.host_name.clone();
    let manager = manager_for(config)?;
    let outcome = manager.loader().discover().await?;

    let order = resolver
        .resolve(&outcome.candidates)
        .map_err(|failure| KernelError::from(PluginSystemError::Resolution(failure)))?;
    println!("{}", host_name);
    for candidate in order {
        println!("{}", candidate.name());
    }
    Ok(())
}

async fn load(config: LoaderConfig) -> Result<()> {
    let mut app = Application::new(config)?;
    app.run().await?;
    for plugin in app.plugin_manager().loaded_plugins().await {
        println!("{} v{}", plugin.name(), plugin.version());
    }
    app.shutdown().await
}

async fn set_enabled(config: LoaderConfig, identity: &str, enabled: bool) -> Result<()> {
    let manager = manager_for(config)?;
    let identity = PluginIdentity::new(identity);
    if enabled {
        manager.enable_plugin(&identity).await?;
    } else {
        manager.disable_plugin(&identity).await?;
    }
    println!("{} {}", identity, if enabled { "enabled" } else { "disabled" });
    Ok(())
}

async fn read(config: LoaderConfig, name: &str) -> Result<()> {
    let mut app = Application::new(config)?;
    app.run().await?;

    let contents = match app.plugin_manager().resource_router().await {
        Ok(router) => router
            .read_file(name)
            .map_err(|e| KernelError::from(PluginSystemError::from(e))),
        Err(e) => Err(e),
    };
    let shutdown = app.shutdown().await;
    let contents = contents?;
    shutdown?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&contents)
        .and_then(|_| stdout.flush())
        .map_err(|e| KernelError::Other(format!("Failed to write to stdout: {}", e)))
}
