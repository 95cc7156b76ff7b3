//! Plugin host core: discovery, dependency resolution and the transactional
//! plugin lifecycle, plus content tables and resource routing.
pub mod kernel;
pub mod plugin_system;
pub mod storage;

pub use kernel::error::Error as KernelError;
pub use kernel::Application;
pub use plugin_system::{DefaultPluginManager, Plugin, PluginManager, PluginManifest};
pub use storage::{LoaderConfig, StorageProvider};

#[cfg(test)]
mod tests;
