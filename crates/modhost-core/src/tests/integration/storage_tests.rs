#![cfg(test)]

use std::fs;
use std::path::Path;

use tempfile::tempdir;

use crate::kernel::bootstrap::Application;
use crate::plugin_system::manager::{LoaderState, PluginManager};
use crate::plugin_system::manifest::RunMode;
use crate::storage::config::LoaderConfig;
use crate::storage::local::LocalStorageProvider;

fn write_manifest(plugin_dir: &Path, identity: &str, body: &str, file: &str) {
    let root = plugin_dir.join(identity);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(file), body).unwrap();
}

#[tokio::test]
async fn test_config_file_drives_a_full_session() {
    let dir = tempdir().expect("Failed to create temp dir");
    let plugins = dir.path().join("mods");
    write_manifest(&plugins, "core", r#"{"name": "Core", "version": "2.1"}"#, "manifest.json");
    write_manifest(
        &plugins,
        "extras",
        "name = \"Extras\"\nversion = \"0.3\"\n\n[[dependencies]]\nname = \"Core\"\nmin_version = \"2.0\"\n",
        "manifest.toml",
    );

    let provider = LocalStorageProvider::new(dir.path().to_path_buf());
    let config = LoaderConfig {
        plugin_dir: plugins.clone(),
        run_mode: RunMode::Server,
        ..LoaderConfig::default()
    };
    config.save(&provider, Path::new("loader.toml")).unwrap();

    let loaded = LoaderConfig::load(&provider, Path::new("loader.toml")).unwrap();
    assert_eq!(loaded, config);

    let mut app = Application::new(loaded).unwrap();
    app.run().await.unwrap();
    let manager = app.plugin_manager().clone();
    assert_eq!(manager.state(), LoaderState::Active);
    assert_eq!(manager.loaded_names_newest_first().await, vec!["Extras", "Core", "Host"]);
    assert_eq!(manager.network_id("Extras").await, Some(2));

    app.shutdown().await.unwrap();
    assert_eq!(manager.state(), LoaderState::Idle);
}

#[tokio::test]
async fn test_unsatisfied_version_disables_only_the_dependent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let plugins = dir.path().join("mods");
    write_manifest(&plugins, "core", r#"{"name": "Core", "version": "1.0"}"#, "manifest.json");
    write_manifest(
        &plugins,
        "extras",
        r#"{"name": "Extras", "version": "1.0", "dependencies": ["Core@3.0"]}"#,
        "manifest.json",
    );

    let config = LoaderConfig {
        plugin_dir: plugins.clone(),
        ..LoaderConfig::default()
    };
    let mut app = Application::new(config).unwrap();
    let err = app.run().await.unwrap_err();
    assert!(err.to_string().contains("Extras"), "got: {}", err);
    assert!(!app.is_started());

    let manager = app.plugin_manager().clone();
    assert_eq!(manager.state(), LoaderState::Errored);
    assert!(manager.last_error().is_some());
    assert!(!plugins.join("core.enabled").exists());
    assert_eq!(fs::read_to_string(plugins.join("extras.enabled")).unwrap(), "false");

    // The disabled dependent stays out of the next session
    let report = manager.reload().await.unwrap();
    assert_eq!(report.order, vec!["Host", "Core"]);
    assert!(!manager.is_loaded("Extras").await);
}
