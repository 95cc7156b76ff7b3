//! Plugin discovery.
//!
//! An [`ArchiveSource`] yields raw packages; [`PluginLoader::discover`] parses
//! their manifests and filters them by enable flag and audience. A package
//! that cannot be read or parsed is logged and left out; it never fails the
//! whole discovery.
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::kernel::error::{Error, Result};
use crate::plugin_system::manifest::{
    ManifestError, ManifestFormat, PluginCandidate, PluginIdentity, PluginManifest, RunMode, JSON_MANIFEST_FILE,
};
use crate::storage::flags::PluginFlagStore;

/// A located package before its manifest is parsed
#[derive(Debug, Clone)]
pub struct RawArchive {
    pub identity: PluginIdentity,
    pub root: Option<PathBuf>,
    pub manifest_bytes: Vec<u8>,
    pub format: ManifestFormat,
}

impl RawArchive {
    pub fn new(identity: impl Into<String>, manifest_bytes: Vec<u8>, format: ManifestFormat) -> Self {
        Self {
            identity: PluginIdentity::new(identity),
            root: None,
            manifest_bytes,
            format,
        }
    }

    /// In-memory archive holding a JSON rendering of `manifest`
    pub fn from_manifest(identity: impl Into<String>, manifest: &PluginManifest) -> std::result::Result<Self, ManifestError> {
        Ok(Self::new(identity, manifest.to_json()?.into_bytes(), ManifestFormat::Json))
    }
}

/// Supplies raw packages to the loader
#[async_trait]
pub trait ArchiveSource: Send + Sync + Debug {
    /// Every package currently available, in discovery order
    async fn discover(&self) -> Result<Vec<RawArchive>>;
}

/// Treats each subdirectory of a plugin directory holding a manifest as a package.
/// Packages are reported sorted by identity.
#[derive(Debug, Clone)]
pub struct DirectoryArchiveSource {
    dir: PathBuf,
}

impl DirectoryArchiveSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn manifest_candidates(root: &Path) -> Vec<PathBuf> {
    let mut files = vec![root.join(JSON_MANIFEST_FILE)];
    #[cfg(feature = "toml-config")]
    files.push(root.join(crate::plugin_system::manifest::TOML_MANIFEST_FILE));
    files
}

async fn read_package(root: PathBuf) -> Result<Option<RawArchive>> {
    let identity = match root.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return Ok(None),
    };

    for manifest_path in manifest_candidates(&root) {
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            continue;
        }
        let Some(format) = ManifestFormat::from_path(&manifest_path) else {
            continue;
        };
        let bytes = tokio::fs::read(&manifest_path)
            .await
            .map_err(|e| Error::io(e, "read_manifest", manifest_path.clone()))?;
        return Ok(Some(RawArchive {
            identity: PluginIdentity::new(identity),
            root: Some(root),
            manifest_bytes: bytes,
            format,
        }));
    }

    log::debug!("Skipping '{}': no manifest found", root.display());
    Ok(None)
}

#[async_trait]
impl ArchiveSource for DirectoryArchiveSource {
    async fn discover(&self) -> Result<Vec<RawArchive>> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            log::info!("Plugin directory {} does not exist; no plugins to load", self.dir.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::io(e, "read_dir", self.dir.clone()))?;

        // Packages share nothing, so read them concurrently
        let mut reads = JoinSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(e, "read_dir_entry", self.dir.clone()))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                reads.spawn(read_package(entry.path()));
            }
        }

        let mut archives = Vec::new();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok(Ok(Some(archive))) => archives.push(archive),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => log::warn!("Failed to read plugin package: {}", e),
                Err(e) => log::error!("Plugin package reader task failed: {}", e),
            }
        }
        archives.sort_by(|a, b| a.identity.cmp(&b.identity));

        Ok(archives)
    }
}

/// Fixed set of in-memory packages, reported in insertion order
#[derive(Debug, Clone, Default)]
pub struct StaticArchiveSource {
    archives: Vec<RawArchive>,
}

impl StaticArchiveSource {
    pub fn new(archives: Vec<RawArchive>) -> Self {
        Self { archives }
    }

    pub fn push(&mut self, archive: RawArchive) {
        self.archives.push(archive);
    }
}

#[async_trait]
impl ArchiveSource for StaticArchiveSource {
    async fn discover(&self) -> Result<Vec<RawArchive>> {
        Ok(self.archives.clone())
    }
}

/// A package whose manifest was rejected
#[derive(Debug, Clone)]
pub struct RejectedArchive {
    pub identity: PluginIdentity,
    pub error: ManifestError,
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Enabled packages meant for this run mode, in discovery order
    pub candidates: Vec<PluginCandidate>,
    /// Packages whose persistent flag is off
    pub disabled: Vec<PluginCandidate>,
    /// Packages for the other side (client-only on a server and vice versa)
    pub other_side: Vec<PluginCandidate>,
    pub rejected: Vec<RejectedArchive>,
}

impl DiscoveryOutcome {
    /// Every parsed package regardless of flag or side, in discovery order
    pub fn all_parsed(&self) -> impl Iterator<Item = &PluginCandidate> {
        self.candidates.iter().chain(self.disabled.iter()).chain(self.other_side.iter())
    }
}

/// Turns raw packages into resolver candidates
#[derive(Debug, Clone)]
pub struct PluginLoader {
    source: Arc<dyn ArchiveSource>,
    flags: Arc<dyn PluginFlagStore>,
    run_mode: RunMode,
    host_api: semver::Version,
}

impl PluginLoader {
    pub fn new(
        source: Arc<dyn ArchiveSource>,
        flags: Arc<dyn PluginFlagStore>,
        run_mode: RunMode,
        host_api: semver::Version,
    ) -> Self {
        Self {
            source,
            flags,
            run_mode,
            host_api,
        }
    }

    pub fn flags(&self) -> &Arc<dyn PluginFlagStore> {
        &self.flags
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub async fn discover(&self) -> Result<DiscoveryOutcome> {
        let archives = self.source.discover().await?;
        Ok(self.classify(archives))
    }

    /// Parse and filter already-read packages
    pub fn classify(&self, archives: Vec<RawArchive>) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();

        for archive in archives {
            let parsed = PluginManifest::parse(&archive.manifest_bytes, archive.format)
                .and_then(|m| m.check_api_compat(&self.host_api).map(|_| m));
            let manifest = match parsed {
                Ok(manifest) => manifest,
                Err(error) => {
                    log::warn!("Excluding plugin '{}': {}", archive.identity, error);
                    outcome.rejected.push(RejectedArchive {
                        identity: archive.identity,
                        error,
                    });
                    continue;
                }
            };

            let candidate = PluginCandidate {
                identity: archive.identity,
                manifest,
                root: archive.root,
            };

            if !self.flags.is_enabled(&candidate.identity) {
                log::debug!("Plugin '{}' is disabled", candidate.identity);
                outcome.disabled.push(candidate);
            } else if !candidate.manifest.side.loads_on(self.run_mode) {
                log::debug!("Plugin '{}' does not load on {}", candidate.identity, self.run_mode);
                outcome.other_side.push(candidate);
            } else {
                outcome.candidates.push(candidate);
            }
        }

        outcome
    }
}
