use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use thiserror::Error;

/// Error type for version parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version format: '{0}'")]
    InvalidFormat(String),
    #[error("Version component '{component}' in '{version}' is not a number")]
    InvalidComponent { version: String, component: String },
}

/// Four-part plugin version (major.minor.patch.revision).
///
/// Ordering is component-wise, so `1.10` sorts after `1.9`. Missing
/// components parse as zero: `"2"` and `"2.0.0.0"` are the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub revision: u32,
}

impl PluginVersion {
    pub const fn new(major: u32, minor: u32, patch: u32, revision: u32) -> Self {
        Self { major, minor, patch, revision }
    }

    /// Parses one to four dot-separated numeric components.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        let parts: Vec<&str> = trimmed.split('.').collect();
        if trimmed.is_empty() || parts.len() > 4 {
            return Err(VersionError::InvalidFormat(text.to_string()));
        }

        let mut components = [0u32; 4];
        for (slot, part) in components.iter_mut().zip(parts.iter()) {
            *slot = part.parse::<u32>().map_err(|_| VersionError::InvalidComponent {
                version: text.to_string(),
                component: part.to_string(),
            })?;
        }

        Ok(Self::new(components[0], components[1], components[2], components[3]))
    }

    /// True when this version is at or above `required`.
    pub fn meets_minimum(&self, required: &PluginVersion) -> bool {
        self >= required
    }
}

impl FromStr for PluginVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PluginVersion::parse(s)
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for PluginVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PluginVersion::parse(&value)
    }
}

impl From<PluginVersion> for String {
    fn from(value: PluginVersion) -> Self {
        value.to_string()
    }
}

/// Checks whether a plugin built against `built_against` can run on a host
/// exposing `host_api`. Uses caret semantics, so `0.1.x` hosts only accept
/// `0.1.*` plugins while `1.x` hosts accept any older `1.*` plugin.
pub fn is_api_compatible(host_api: &Version, built_against: &Version) -> bool {
    match VersionReq::parse(&format!("^{}", built_against)) {
        Ok(req) => req.matches(host_api),
        Err(e) => {
            log::warn!("Could not build API requirement from '{}': {}", built_against, e);
            false
        }
    }
}
