//! # Modhost Plugin System
//!
//! Discovers plugin packages, orders them by their declared dependencies and
//! drives every plugin through one transactional load session: either the
//! whole set activates or the loader ends up `Errored` with a readable report
//! and the offending plugins disabled.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`version`]**: Four-part plugin versions and host API compatibility.
//! - **[`manifest`]**: Plugin metadata ([`PluginManifest`]) and resolver candidates.
//! - **[`dependency`]**: Dependency declarations, ordering edges and per-plugin
//!   resolution errors.
//! - **[`resolver`]**: Validation and deterministic topological ordering
//!   ([`DependencyResolver`]).
//! - **[`loader`]**: Package discovery and enable/side filtering ([`PluginLoader`]).
//! - **[`instantiate`]**: Turning candidates into live [`Plugin`] objects.
//! - **[`content`]**: Content tables, hot keys, recipes and the hook contexts.
//! - **[`registry`]**: The runtime plugin set ([`PluginRegistry`]).
//! - **[`resources`]**: `owner/path` resource routing.
//! - **[`progress`]**: Progress events for long sessions.
//! - **[`manager`]**: The session orchestrator ([`PluginManager`]).
//! - **[`traits`]**: The [`Plugin`] trait and lifecycle vocabulary.
//! - **[`error`]**: [`PluginSystemError`], what a failed session reports.
pub mod content;
pub mod dependency;
pub mod error;
pub mod instantiate;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod resources;
pub mod traits;
pub mod version;

pub use content::{ContentId, ContentKind, ContentRegistry, PluginContext, RecipeBuilder, VanillaContent};
pub use dependency::{DependencyError, PluginDependency};
pub use error::PluginSystemError;
pub use instantiate::{PluginInstantiator, StaticInstantiator};
pub use loader::{DirectoryArchiveSource, PluginLoader, RawArchive, StaticArchiveSource};
pub use manager::{DefaultPluginManager, LoadReport, LoaderState, PluginManager};
pub use manifest::{ManifestBuilder, PluginCandidate, PluginIdentity, PluginManifest, RunMode};
pub use progress::{ProgressEvent, ProgressPhase, ProgressSink};
pub use registry::{LoadedPlugin, PluginRegistry};
pub use resolver::{DependencyResolver, ResolutionFailure, ResolveContext};
pub use resources::ResourceRouter;
pub use traits::{Hook, LifecyclePhase, Plugin, PluginError, PluginResult, ResourceKind};
pub use version::PluginVersion;
