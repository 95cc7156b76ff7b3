/// Application name
pub const APP_NAME: &str = "modhost";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plugin API version exposed to plugins
pub const API_VERSION: &str = "0.1.0";

/// Reserved name of the host pseudo-plugin; no plugin may use it
pub const HOST_PLUGIN_NAME: &str = "Host";

/// Default plugins directory
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Extension of the sidecar file holding a plugin's enable flag
pub const ENABLED_FLAG_EXTENSION: &str = "enabled";
