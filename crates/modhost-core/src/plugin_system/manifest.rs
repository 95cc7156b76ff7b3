use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin_system::dependency::{DependencyEdge, EdgeKind, PluginDependency};
use crate::plugin_system::version::{is_api_compatible, PluginVersion, VersionError};

/// File name of a JSON manifest inside a plugin directory
pub const JSON_MANIFEST_FILE: &str = "manifest.json";
/// File name of a TOML manifest inside a plugin directory
#[cfg(feature = "toml-config")]
pub const TOML_MANIFEST_FILE: &str = "manifest.toml";

/// Plugin names match case-insensitively, folded with Unicode lowercasing
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Which host processes a plugin may run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Audience {
    #[default]
    #[serde(rename = "both")]
    Both,
    #[serde(rename = "client")]
    ClientOnly,
    #[serde(rename = "server")]
    ServerOnly,
}

impl Audience {
    /// Server processes skip client-only plugins and vice versa
    pub fn loads_on(self, mode: RunMode) -> bool {
        match (self, mode) {
            (Audience::Both, _) => true,
            (Audience::ClientOnly, RunMode::Client) => true,
            (Audience::ServerOnly, RunMode::Server) => true,
            _ => false,
        }
    }
}

/// The kind of host process the loader runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Client,
    /// Headless; textures and sounds are never served
    Server,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Client => write!(f, "client"),
            RunMode::Server => write!(f, "server"),
        }
    }
}

/// Encoding of a raw manifest blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ManifestFormat {
    /// Determine format from a manifest file name
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ManifestFormat::Json),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ManifestFormat::Toml),
                _ => None,
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManifestFormat::Json => "JSON",
            #[cfg(feature = "toml-config")]
            ManifestFormat::Toml => "TOML",
        }
    }
}

/// Author-facing manifest problems. Excludes one plugin, never the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("Invalid {format} manifest: {message}")]
    Syntax { format: &'static str, message: String },

    #[error("Invalid version in field '{field}': {source}")]
    InvalidVersion {
        field: String,
        #[source]
        source: VersionError,
    },

    #[error("Invalid API version '{value}': {message}")]
    InvalidApiVersion { value: String, message: String },

    #[error("A dependency entry in '{field}' has an empty name")]
    EmptyDependencyName { field: &'static str },

    #[error("Plugin '{name}' cannot depend on itself")]
    SelfDependency { name: String },

    #[error("Plugin '{name}' targets API {required}, which host API {host} does not support")]
    IncompatibleApi {
        name: String,
        required: semver::Version,
        host: semver::Version,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(String),
}

/// Immutable description of one plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    /// Internal name, unique across a load (case-insensitive)
    pub name: String,
    pub version: PluginVersion,
    pub display_name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// Host API version the plugin was built against
    pub api_version: Option<semver::Version>,
    /// Hard dependencies, in declaration order
    pub dependencies: Vec<PluginDependency>,
    /// Weak references, in declaration order
    pub weak_references: Vec<PluginDependency>,
    /// Plugins this one should load before, when present
    pub sort_before: Vec<String>,
    /// Plugins this one should load after, when present
    pub sort_after: Vec<String>,
    pub side: Audience,
}

// Manifest wire shape. Dependencies accept "Name", "Name@1.2" or an object.
#[derive(Debug, Serialize, Deserialize)]
struct RawPluginManifest {
    #[serde(default)]
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    weak_references: Vec<RawDependency>,
    #[serde(default)]
    sort_before: Vec<String>,
    #[serde(default)]
    sort_after: Vec<String>,
    #[serde(default)]
    side: Audience,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Short(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_version: Option<String>,
    },
}

fn default_version() -> String {
    "1.0".to_string()
}

impl RawDependency {
    fn into_dependency(self, field: &'static str, weak: bool) -> Result<PluginDependency, ManifestError> {
        let (name, min_version) = match self {
            RawDependency::Short(text) => match text.split_once('@') {
                Some((name, version)) => (name.trim().to_string(), Some(version.trim().to_string())),
                None => (text.trim().to_string(), None),
            },
            RawDependency::Full { name, min_version } => (name.trim().to_string(), min_version),
        };

        if name.is_empty() {
            return Err(ManifestError::EmptyDependencyName { field });
        }

        let min_version = match min_version {
            Some(text) => Some(PluginVersion::parse(&text).map_err(|source| ManifestError::InvalidVersion {
                field: format!("{}.{}", field, name),
                source,
            })?),
            None => None,
        };

        Ok(PluginDependency {
            plugin_name: name,
            min_version,
            weak,
        })
    }

    fn from_dependency(dep: &PluginDependency) -> Self {
        RawDependency::Full {
            name: dep.plugin_name.clone(),
            min_version: dep.min_version.map(|v| v.to_string()),
        }
    }
}

impl TryFrom<RawPluginManifest> for PluginManifest {
    type Error = ManifestError;

    fn try_from(raw: RawPluginManifest) -> Result<Self, Self::Error> {
        let version = PluginVersion::parse(&raw.version).map_err(|source| ManifestError::InvalidVersion {
            field: "version".to_string(),
            source,
        })?;

        let api_version = match raw.api_version {
            Some(text) => Some(semver::Version::parse(text.trim()).map_err(|e| {
                ManifestError::InvalidApiVersion {
                    value: text.clone(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|d| d.into_dependency("dependencies", false))
            .collect::<Result<Vec<_>, _>>()?;
        let weak_references = raw
            .weak_references
            .into_iter()
            .map(|d| d.into_dependency("weak_references", true))
            .collect::<Result<Vec<_>, _>>()?;

        let manifest = PluginManifest {
            name: raw.name.trim().to_string(),
            version,
            display_name: raw.display_name,
            author: raw.author,
            description: raw.description,
            homepage: raw.homepage,
            api_version,
            dependencies,
            weak_references,
            sort_before: raw.sort_before.into_iter().map(|s| s.trim().to_string()).collect(),
            sort_after: raw.sort_after.into_iter().map(|s| s.trim().to_string()).collect(),
            side: raw.side,
        };

        if !manifest.name.is_empty() {
            let self_reference = manifest
                .dependencies
                .iter()
                .chain(manifest.weak_references.iter())
                .any(|d| same_name(&d.plugin_name, &manifest.name));
            if self_reference {
                return Err(ManifestError::SelfDependency { name: manifest.name });
            }
        }

        Ok(manifest)
    }
}

impl From<&PluginManifest> for RawPluginManifest {
    fn from(manifest: &PluginManifest) -> Self {
        RawPluginManifest {
            name: manifest.name.clone(),
            version: manifest.version.to_string(),
            display_name: manifest.display_name.clone(),
            author: manifest.author.clone(),
            description: manifest.description.clone(),
            homepage: manifest.homepage.clone(),
            api_version: manifest.api_version.as_ref().map(|v| v.to_string()),
            dependencies: manifest.dependencies.iter().map(RawDependency::from_dependency).collect(),
            weak_references: manifest.weak_references.iter().map(RawDependency::from_dependency).collect(),
            sort_before: manifest.sort_before.clone(),
            sort_after: manifest.sort_after.clone(),
            side: manifest.side,
        }
    }
}

impl PluginManifest {
    /// Create a manifest with no relationships
    pub fn new(name: &str, version: PluginVersion) -> Self {
        Self {
            name: name.to_string(),
            version,
            display_name: None,
            author: None,
            description: None,
            homepage: None,
            api_version: None,
            dependencies: Vec::new(),
            weak_references: Vec::new(),
            sort_before: Vec::new(),
            sort_after: Vec::new(),
            side: Audience::Both,
        }
    }

    /// Parse a raw manifest blob.
    ///
    /// An empty `name` is accepted here; the resolver reports it alongside the
    /// other naming problems of the batch.
    pub fn parse(bytes: &[u8], format: ManifestFormat) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ManifestError::Syntax {
            format: format.name(),
            message: e.to_string(),
        })?;

        let raw: RawPluginManifest = match format {
            ManifestFormat::Json => serde_json::from_str(text).map_err(|e| ManifestError::Syntax {
                format: format.name(),
                message: e.to_string(),
            })?,
            #[cfg(feature = "toml-config")]
            ManifestFormat::Toml => toml::from_str(text).map_err(|e| ManifestError::Syntax {
                format: format.name(),
                message: e.to_string(),
            })?,
        };

        PluginManifest::try_from(raw)
    }

    /// Serialize to the JSON manifest shape accepted by [`PluginManifest::parse`]
    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(&RawPluginManifest::from(self))
            .map_err(|e| ManifestError::Serialize(e.to_string()))
    }

    /// Name shown to users, falling back to the internal name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Hard edges, optionally including weak references.
    pub fn required_edges(&self, include_weak: bool) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .dependencies
            .iter()
            .map(|d| DependencyEdge::new(&self.name, &d.plugin_name, EdgeKind::Hard))
            .collect();
        if include_weak {
            edges.extend(
                self.weak_references
                    .iter()
                    .map(|d| DependencyEdge::new(&self.name, &d.plugin_name, EdgeKind::Hard)),
            );
        }
        edges
    }

    /// Ordering hints: weak references, `sort_after` and `sort_before`.
    ///
    /// `sort_before` targets are flipped so that every edge reads
    /// "`to` loads before `from`".
    pub fn order_edges(&self) -> Vec<DependencyEdge> {
        let weak = self
            .weak_references
            .iter()
            .map(|d| DependencyEdge::new(&self.name, &d.plugin_name, EdgeKind::OrderOnly));
        let after = self
            .sort_after
            .iter()
            .map(|target| DependencyEdge::new(&self.name, target, EdgeKind::OrderOnly));
        let before = self
            .sort_before
            .iter()
            .rev()
            .map(|target| DependencyEdge::new(target, &self.name, EdgeKind::OrderOnly));
        weak.chain(after).chain(before).collect()
    }

    /// Rejects plugins built against an API the host cannot serve
    pub fn check_api_compat(&self, host_api: &semver::Version) -> Result<(), ManifestError> {
        match &self.api_version {
            Some(required) if !is_api_compatible(host_api, required) => Err(ManifestError::IncompatibleApi {
                name: self.name.clone(),
                required: required.clone(),
                host: host_api.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Builder for creating a plugin manifest
pub struct ManifestBuilder {
    manifest: PluginManifest,
}

impl ManifestBuilder {
    /// Create a new manifest builder. Invalid version text falls back to 1.0.
    pub fn new(name: &str, version: &str) -> Self {
        let version = PluginVersion::parse(version).unwrap_or(PluginVersion::new(1, 0, 0, 0));
        Self {
            manifest: PluginManifest::new(name, version),
        }
    }

    pub fn display_name(mut self, display_name: &str) -> Self {
        self.manifest.display_name = Some(display_name.to_string());
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.manifest.author = Some(author.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.manifest.description = Some(description.to_string());
        self
    }

    pub fn api_version(mut self, version: semver::Version) -> Self {
        self.manifest.api_version = Some(version);
        self
    }

    /// Add a hard dependency
    pub fn dependency(mut self, name: &str, min_version: Option<&str>) -> Self {
        let min = min_version.and_then(|v| PluginVersion::parse(v).ok());
        self.manifest.dependencies.push(PluginDependency::required(name, min));
        self
    }

    /// Add a weak reference
    pub fn weak_reference(mut self, name: &str, min_version: Option<&str>) -> Self {
        let min = min_version.and_then(|v| PluginVersion::parse(v).ok());
        self.manifest.weak_references.push(PluginDependency::weak(name, min));
        self
    }

    pub fn sort_before(mut self, name: &str) -> Self {
        self.manifest.sort_before.push(name.to_string());
        self
    }

    pub fn sort_after(mut self, name: &str) -> Self {
        self.manifest.sort_after.push(name.to_string());
        self
    }

    pub fn side(mut self, side: Audience) -> Self {
        self.manifest.side = side;
        self
    }

    pub fn build(self) -> PluginManifest {
        self.manifest
    }
}

/// Stable identity of a located plugin package, e.g. its directory name.
/// Keys the persistent enable flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginIdentity(String);

impl PluginIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A located plugin package paired with its parsed manifest.
#[derive(Debug, Clone)]
pub struct PluginCandidate {
    pub identity: PluginIdentity,
    pub manifest: PluginManifest,
    /// Package directory, when the candidate came from disk
    pub root: Option<PathBuf>,
}

impl PluginCandidate {
    pub fn new(identity: impl Into<String>, manifest: PluginManifest) -> Self {
        Self {
            identity: PluginIdentity::new(identity),
            manifest,
            root: None,
        }
    }

    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = Some(root);
        self
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}
