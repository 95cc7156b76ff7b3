//! # Storage
//!
//! Filesystem access for the loader: a [`StorageProvider`] abstraction with a
//! local implementation that writes atomically, the [`LoaderConfig`] file, and
//! the persistent per-plugin enable flags.
pub mod config;
pub mod error;
pub mod flags;
pub mod local;
pub mod provider;

pub use config::{ConfigFormat, LoaderConfig};
pub use flags::{MemoryFlagStore, PluginFlagStore, SidecarFlagStore};
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;
