use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::plugin_system::content::VanillaContent;
use crate::plugin_system::manifest::RunMode;
use crate::plugin_system::resolver::ResolveContext;
use crate::storage::error::StorageSystemError;
use crate::storage::StorageProvider;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Settings for the plugin loader. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory scanned for plugin packages
    pub plugin_dir: PathBuf,
    /// Files served under the host identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_content_dir: Option<PathBuf>,
    pub run_mode: RunMode,
    /// Reserved identifier of the host pseudo-plugin
    pub host_name: String,
    /// Require weak references to be present
    pub building: bool,
    /// Report every resolver pass instead of stopping at the first failing one
    pub exhaustive_resolution: bool,
    pub vanilla_content: VanillaContent,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(constants::DEFAULT_PLUGINS_DIR),
            host_content_dir: None,
            run_mode: RunMode::Client,
            host_name: constants::HOST_PLUGIN_NAME.to_string(),
            building: false,
            exhaustive_resolution: false,
            vanilla_content: VanillaContent::default(),
        }
    }
}

impl LoaderConfig {
    /// Resolver settings derived from this config
    pub fn resolve_context(&self) -> ResolveContext {
        ResolveContext {
            reserved_name: self.host_name.clone(),
            building: self.building,
            exhaustive: self.exhaustive_resolution,
        }
    }

    /// Deserialize from string based on format
    pub fn parse(data: &str, format: ConfigFormat) -> Result<Self> {
        let parsed: LoaderConfig = match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| deserialize_error("JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| deserialize_error("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| deserialize_error("TOML", e)),
        }?;
        Ok(parsed)
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        let text = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| serialize_error("JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| serialize_error("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| serialize_error("TOML", e)),
        }?;
        Ok(text)
    }

    /// Load a config file; the format follows the file extension.
    pub fn load(provider: &dyn StorageProvider, path: &Path) -> Result<Self> {
        let format = format_for(path)?;
        if !provider.is_file(path) {
            return Err(StorageSystemError::FileNotFound(path.to_path_buf()).into());
        }
        let text = provider.read_to_string(path)?;
        let config = Self::parse(&text, format)?;
        log::debug!("Loaded loader config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, provider: &dyn StorageProvider, path: &Path) -> Result<()> {
        let format = format_for(path)?;
        provider.write_string(path, &self.serialize(format)?)
    }
}

fn format_for(path: &Path) -> Result<ConfigFormat> {
    ConfigFormat::from_path(path).ok_or_else(|| {
        Error::from(StorageSystemError::UnsupportedConfigFormat(path.display().to_string()))
    })
}

fn deserialize_error(format: &str, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    StorageSystemError::DeserializationError {
        format: format.to_string(),
        source: Box::new(source),
    }
    .into()
}

fn serialize_error(format: &str, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    StorageSystemError::SerializationError {
        format: format.to_string(),
        source: Box::new(source),
    }
    .into()
}
