#![cfg(test)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::plugin_system::content::PluginContext;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::instantiate::StaticInstantiator;
use crate::plugin_system::loader::{PluginLoader, RawArchive, StaticArchiveSource};
use crate::plugin_system::manager::{host_api_version, DefaultPluginManager, LoaderState, PluginManager};
use crate::plugin_system::manifest::{ManifestBuilder, RunMode};
use crate::plugin_system::progress::NullProgressSink;
use crate::plugin_system::traits::{Plugin, PluginError, PluginResult};
use crate::storage::config::LoaderConfig;
use crate::storage::flags::MemoryFlagStore;

/// Blocks in `load` until the test opens the gate
struct GatedPlugin {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl Plugin for GatedPlugin {
    fn name(&self) -> &str {
        "Gated"
    }

    fn load(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        let gate = self.gate.lock().map_err(|_| PluginError::msg("gate poisoned"))?;
        gate.recv_timeout(Duration::from_secs(10))
            .map_err(|e| PluginError::msg(format!("gate never opened: {}", e)))
    }
}

fn gated_manager() -> (DefaultPluginManager, mpsc::Sender<()>) {
    let (open, gate) = mpsc::channel();
    let manifest = ManifestBuilder::new("Gated", "1.0").build();
    let source = StaticArchiveSource::new(vec![RawArchive::from_manifest("gated", &manifest).unwrap()]);

    let mut instantiator = StaticInstantiator::new();
    instantiator.register_instance(Arc::new(GatedPlugin { gate: Mutex::new(gate) }));

    let loader = PluginLoader::new(
        Arc::new(source),
        Arc::new(MemoryFlagStore::new()),
        RunMode::Client,
        host_api_version().unwrap(),
    );
    let manager = DefaultPluginManager::new(LoaderConfig::default(), loader, Arc::new(instantiator))
        .unwrap()
        .with_progress(Arc::new(NullProgressSink));
    (manager, open)
}

fn assert_rejected<T: std::fmt::Debug>(result: crate::kernel::error::Result<T>) {
    let err = result.expect_err("a second session must be rejected");
    assert!(
        matches!(err.as_plugin_system(), Some(PluginSystemError::SessionInProgress)),
        "unexpected error: {:?}",
        err
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_session_is_rejected_while_one_runs() {
    let (manager, open) = gated_manager();
    let mut states = manager.subscribe_state();

    let running = manager.spawn_load();
    tokio::time::timeout(Duration::from_secs(10), states.wait_for(|s| *s == LoaderState::Loading))
        .await
        .expect("load never reached the Loading phase")
        .expect("state channel closed");

    assert_rejected(manager.load().await);
    assert_rejected(manager.unload().await);
    assert_rejected(manager.reload().await);
    // Read access still works mid-session
    assert_eq!(manager.state(), LoaderState::Loading);

    open.send(()).unwrap();
    let report = running.await.expect("load task panicked").expect("gated load should succeed");
    assert_eq!(report.order, vec!["Host", "Gated"]);
    assert_eq!(manager.state(), LoaderState::Active);

    // The guard is released once the session ends
    manager.unload().await.unwrap();
    assert_eq!(manager.state(), LoaderState::Idle);
}

#[tokio::test]
async fn test_clones_share_one_session() {
    let (manager, open) = gated_manager();
    let other = manager.clone();

    open.send(()).unwrap();
    manager.load().await.unwrap();
    assert_eq!(other.state(), LoaderState::Active);
    assert!(other.get_plugin("gated").await.is_some());

    other.unload().await.unwrap();
    assert_eq!(manager.state(), LoaderState::Idle);
}

/// Holds its Load hook for a fixed time
struct SlowPlugin {
    delay: Duration,
}

impl Plugin for SlowPlugin {
    fn name(&self) -> &str {
        "Slow"
    }

    fn load(&self, _ctx: &mut PluginContext<'_>) -> PluginResult<()> {
        std::thread::sleep(self.delay);
        Ok(())
    }
}

#[tokio::test]
async fn test_slow_hooks_leave_the_runtime_responsive() {
    let delay = Duration::from_millis(1500);
    let manifest = ManifestBuilder::new("Slow", "1.0").build();
    let source = StaticArchiveSource::new(vec![RawArchive::from_manifest("slow", &manifest).unwrap()]);
    let mut instantiator = StaticInstantiator::new();
    instantiator.register_instance(Arc::new(SlowPlugin { delay }));
    let loader = PluginLoader::new(
        Arc::new(source),
        Arc::new(MemoryFlagStore::new()),
        RunMode::Client,
        host_api_version().unwrap(),
    );
    let manager = DefaultPluginManager::new(LoaderConfig::default(), loader, Arc::new(instantiator))
        .unwrap()
        .with_progress(Arc::new(NullProgressSink));
    let mut states = manager.subscribe_state();

    let running = manager.spawn_load();
    states.wait_for(|s| *s == LoaderState::Loading).await.unwrap();

    // A host tick on the same current-thread runtime while Load sleeps
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let tick = started.elapsed();
    assert!(tick < delay / 2, "host tick waited {:?} behind a plugin hook", tick);
    assert_eq!(manager.state(), LoaderState::Loading);

    let report = running.await.expect("load task panicked").expect("slow load should succeed");
    assert_eq!(report.order, vec!["Host", "Slow"]);
    assert_eq!(manager.state(), LoaderState::Active);
}
