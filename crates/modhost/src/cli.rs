use std::path::PathBuf;

use clap::{Parser, Subcommand};

use modhost_core::kernel::error::Result;
use modhost_core::plugin_system::RunMode;
use modhost_core::storage::{LoaderConfig, LocalStorageProvider};

/// modhost: discovers, orders and loads content plugins
#[derive(Parser, Debug)]
#[command(name = "modhost", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Loader config file (.json, .yaml or .toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory scanned for plugin packages
    #[arg(long, global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Run headless; client-only plugins are skipped
    #[arg(long, global = true)]
    pub server: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List discovered plugins with their enable flags and parse failures
    List,
    /// Print the load order, or why it cannot be computed
    Resolve,
    /// Run a full load session, print the load order, then unload
    Load,
    /// Enable a plugin by package identity (persisted)
    Enable {
        identity: String,
    },
    /// Disable a plugin by package identity (persisted)
    Disable {
        identity: String,
    },
    /// Load plugins and print the bytes of a `<owner>/<path>` file
    Read {
        name: String,
    },
}

impl CliArgs {
    /// Config file values with command-line overrides applied
    pub fn loader_config(&self) -> Result<LoaderConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let provider = LocalStorageProvider::new(PathBuf::from("."));
                LoaderConfig::load(&provider, path)?
            }
            None => LoaderConfig::default(),
        };

        if let Some(dir) = &self.plugin_dir {
            config.plugin_dir = dir.clone();
        }
        if self.server {
            config.run_mode = RunMode::Server;
        }
        Ok(config)
    }
}
