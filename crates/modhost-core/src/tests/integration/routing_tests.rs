#![cfg(test)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use crate::plugin_system::instantiate::StaticInstantiator;
use crate::plugin_system::manager::{DefaultPluginManager, PluginManager};
use crate::plugin_system::manifest::RunMode;
use crate::plugin_system::progress::NullProgressSink;
use crate::plugin_system::resources::ResourceError;
use crate::storage::config::LoaderConfig;

fn write_package(plugin_dir: &Path, identity: &str, name: &str, files: &[(&str, &str)]) {
    let root = plugin_dir.join(identity);
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("manifest.json"),
        format!(r#"{{"name": "{}", "version": "1.0"}}"#, name),
    )
    .unwrap();
    for (path, contents) in files {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, contents).unwrap();
    }
}

fn manager_for(plugin_dir: &Path, host_dir: &Path, run_mode: RunMode) -> DefaultPluginManager {
    let config = LoaderConfig {
        plugin_dir: plugin_dir.to_path_buf(),
        host_content_dir: Some(host_dir.to_path_buf()),
        run_mode,
        ..LoaderConfig::default()
    };
    DefaultPluginManager::from_config(config, StaticInstantiator::new().with_archive_fallback(true))
        .expect("Failed to create plugin manager")
        .with_progress(Arc::new(NullProgressSink))
}

#[tokio::test]
async fn test_qualified_names_route_to_owning_package() {
    let dir = tempdir().expect("Failed to create temp dir");
    let plugins = dir.path().join("plugins");
    let host_dir = dir.path().join("host");
    fs::create_dir_all(&host_dir).unwrap();
    fs::write(host_dir.join("motd.txt"), "welcome").unwrap();
    write_package(
        &plugins,
        "weapons-pack",
        "Weapons",
        &[("Items/Sword.png", "sword-texture"), ("Sounds/Clang.wav", "clang"), ("lore.txt", "old blade")],
    );
    write_package(&plugins, "armor-pack", "Armor", &[("Items/Sword.png", "not-the-same-sword")]);

    let manager = manager_for(&plugins, &host_dir, RunMode::Client);
    let report = manager.load().await.expect("load should succeed");
    assert_eq!(report.order, vec!["Host", "Armor", "Weapons"]);

    let router = manager.resource_router().await.unwrap();
    assert_eq!(router.texture("Weapons/Items/Sword").unwrap(), Some(b"sword-texture".to_vec()));
    assert_eq!(router.texture("Armor/Items/Sword").unwrap(), Some(b"not-the-same-sword".to_vec()));
    assert_eq!(router.sound("weapons/Sounds/Clang").unwrap(), Some(b"clang".to_vec()));
    assert_eq!(router.read_file("Weapons/lore.txt").unwrap(), b"old blade".to_vec());
    assert_eq!(router.read_file("Host/motd.txt").unwrap(), b"welcome".to_vec());

    assert!(matches!(router.read_file("lore.txt"), Err(ResourceError::MissingQualifier(_))));
    assert!(matches!(router.read_file("Shields/lore.txt"), Err(ResourceError::MissingPlugin { .. })));
    assert!(matches!(router.read_file("Armor/lore.txt"), Err(ResourceError::MissingResource(_))));
    assert!(!router.texture_exists("Armor/Items/Axe"));
}

#[tokio::test]
async fn test_server_routes_files_but_not_media() {
    let dir = tempdir().expect("Failed to create temp dir");
    let plugins = dir.path().join("plugins");
    let host_dir = dir.path().join("host");
    fs::create_dir_all(&host_dir).unwrap();
    write_package(&plugins, "weapons", "Weapons", &[("Items/Sword.png", "tex"), ("stats.json", "{}")]);

    let manager = manager_for(&plugins, &host_dir, RunMode::Server);
    manager.load().await.unwrap();
    let router = manager.resource_router().await.unwrap();

    assert_eq!(router.texture("Weapons/Items/Sword").unwrap(), None);
    assert!(!router.texture_exists("Weapons/Items/Sword"));
    assert!(router.file_exists("Weapons/stats.json"));
    assert_eq!(manager.network_id("Weapons").await, Some(1));
}

#[tokio::test]
async fn test_sidecar_flags_persist_across_managers() {
    let dir = tempdir().expect("Failed to create temp dir");
    let plugins = dir.path().join("plugins");
    let host_dir = dir.path().join("host");
    fs::create_dir_all(&host_dir).unwrap();
    write_package(&plugins, "one", "One", &[]);
    write_package(&plugins, "two", "Two", &[]);

    let first = manager_for(&plugins, &host_dir, RunMode::Client);
    first
        .disable_plugin(&crate::plugin_system::manifest::PluginIdentity::new("two"))
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(plugins.join("two.enabled")).unwrap(), "false");

    let second = manager_for(&plugins, &host_dir, RunMode::Client);
    let report = second.load().await.unwrap();
    assert_eq!(report.order, vec!["Host", "One"]);
    assert_eq!(report.discovery.disabled[0].name(), "Two");
}
