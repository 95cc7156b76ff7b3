use std::fmt;

use thiserror::Error;

use crate::plugin_system::version::PluginVersion;

/// A declared relationship from one plugin to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDependency {
    /// Name of the plugin depended upon
    pub plugin_name: String,
    /// Lowest acceptable version, if any
    pub min_version: Option<PluginVersion>,
    /// Weak references only affect ordering (and build-time existence)
    pub weak: bool,
}

impl PluginDependency {
    /// Creates a hard dependency
    pub fn required(name: &str, min_version: Option<PluginVersion>) -> Self {
        Self {
            plugin_name: name.to_string(),
            min_version,
            weak: false,
        }
    }

    /// Creates a weak reference
    pub fn weak(name: &str, min_version: Option<PluginVersion>) -> Self {
        Self {
            plugin_name: name.to_string(),
            min_version,
            weak: true,
        }
    }

    /// Checks if a resolved version satisfies this dependency's minimum
    pub fn is_satisfied_by(&self, version: &PluginVersion) -> bool {
        match &self.min_version {
            Some(min) => version.meets_minimum(min),
            None => true,
        }
    }
}

impl fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plugin_name)?;
        if let Some(min) = &self.min_version {
            write!(f, "@{}", min)?;
        }
        if self.weak {
            write!(f, " (weak)")?;
        }
        Ok(())
    }
}

/// Kind of a derived ordering edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Target must exist (and meet the minimum version)
    Hard,
    /// Target only influences order when it is present
    OrderOnly,
}

/// Derived edge: `to` loads before `from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

impl DependencyEdge {
    pub fn new(from: &str, to: &str, kind: EdgeKind) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        }
    }
}

/// Validation errors produced by the resolver, one per violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("Plugin '{identity}' has an empty name")]
    EmptyName { identity: String },

    #[error("Plugin name '{name}' is reserved by the host")]
    ReservedName { name: String },

    #[error("Two plugins share the internal name {name}")]
    DuplicateName { name: String, identities: Vec<String> },

    #[error("Missing plugin: {dependency} required by {plugin}")]
    MissingDependency { plugin: String, dependency: String },

    #[error("{plugin} requires version {required}+ of {dependency} but version {found} is installed")]
    VersionMismatch {
        plugin: String,
        dependency: String,
        required: PluginVersion,
        found: PluginVersion,
    },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

impl DependencyError {
    /// True for the name validation family (empty, reserved, duplicate)
    pub fn is_name_conflict(&self) -> bool {
        matches!(
            self,
            DependencyError::EmptyName { .. }
                | DependencyError::ReservedName { .. }
                | DependencyError::DuplicateName { .. }
        )
    }
}
