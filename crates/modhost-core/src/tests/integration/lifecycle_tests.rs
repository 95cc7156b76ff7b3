#![cfg(test)]

use crate::plugin_system::content::ContentKind;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manager::{LoaderState, PluginManager};
use crate::plugin_system::manifest::{ManifestBuilder, PluginIdentity, RunMode};
use crate::plugin_system::traits::{Hook, LifecyclePhase, PluginError};
use crate::plugin_system::version::PluginVersion;
use crate::tests::integration::common::{depending, plain, test_host, Journal, RecordingPlugin};

#[tokio::test]
async fn test_plugins_load_in_dependency_order() {
    let journal = Journal::default();
    let host = test_host(
        vec![
            depending("C", &["B"], &journal),
            depending("B", &["A"], &journal),
            plain("A", &journal),
        ],
        RunMode::Client,
    );

    let report = host.manager.load().await.expect("load should succeed");
    assert_eq!(report.order, vec!["Host", "A", "B", "C"]);
    assert_eq!(host.manager.loaded_names_newest_first().await, vec!["C", "B", "A", "Host"]);
    assert_eq!(host.manager.plugin_count().await, 4);
    assert!(host.manager.is_loaded("b").await);

    // Every plugin finishes a phase before any plugin starts the next one
    assert_eq!(
        journal.entries(),
        vec![
            "A.Load",
            "B.Load",
            "C.Load",
            "A.SetupContent",
            "A.PostSetupContent",
            "B.SetupContent",
            "B.PostSetupContent",
            "C.SetupContent",
            "C.PostSetupContent",
        ]
    );
}

#[tokio::test]
async fn test_setup_failure_aborts_session_and_reload_recovers() {
    let journal = Journal::default();
    let (faulty_manifest, faulty) = plain("P3", &journal);
    let host = test_host(
        vec![
            plain("P1", &journal),
            plain("P2", &journal),
            (faulty_manifest, faulty.failing_in(LifecyclePhase::SetupContent)),
            plain("P4", &journal),
            plain("P5", &journal),
        ],
        RunMode::Client,
    );

    let err = host.manager.load().await.unwrap_err();
    match err.as_plugin_system() {
        Some(PluginSystemError::PhaseExecution {
            plugin,
            version,
            phase,
            source,
        }) => {
            assert_eq!(plugin, "P3");
            assert_eq!(*version, PluginVersion::new(1, 0, 0, 0));
            assert_eq!(*phase, LifecyclePhase::SetupContent);
            assert!(matches!(source, PluginError::Failed(_)));
        }
        other => panic!("Expected PhaseExecution, got {:?}", other),
    }
    assert_eq!(host.manager.state(), LoaderState::Errored);
    assert_eq!(host.flags.disabled(), vec![PluginIdentity::new("p3")]);
    let report = host.manager.last_error().expect("failure should be recorded");
    assert!(report.contains("P3"), "report was: {}", report);

    // Nothing is usable after a failed session
    assert!(host.manager.dispatch(Hook::PreUpdate).await.is_err());
    assert!(host.manager.resource_router().await.is_err());
    assert!(journal.calls("SetupContent").ends_with(&["P3".to_string()]));
    assert!(journal.calls("SetupContent").iter().all(|p| p != "P4"));

    journal.clear();
    let report = host.manager.reload().await.expect("reload without the faulty plugin");
    assert_eq!(report.order, vec!["Host", "P1", "P2", "P4", "P5"]);
    assert_eq!(host.manager.state(), LoaderState::Active);
    assert_eq!(report.discovery.disabled.len(), 1);
    assert!(host.manager.last_error().is_none());

    // All five were activated by the failed session, so all five are torn down
    assert_eq!(journal.calls("Unload"), vec!["P5", "P4", "P3", "P2", "P1"]);
    assert_eq!(journal.calls("Load"), vec!["P1", "P2", "P4", "P5"]);
}

#[tokio::test]
async fn test_unload_runs_newest_first_and_survives_failures() {
    let journal = Journal::default();
    let (b_manifest, b) = depending("B", &["A"], &journal);
    let host = test_host(
        vec![
            depending("C", &["B"], &journal),
            (b_manifest, b.failing_in(LifecyclePhase::Unload)),
            plain("A", &journal),
        ],
        RunMode::Client,
    );

    host.manager.load().await.unwrap();
    host.manager.unload().await.expect("teardown errors never fail an unload");

    assert_eq!(journal.calls("Unload"), vec!["C", "B", "A"]);
    assert_eq!(host.manager.state(), LoaderState::Idle);
    assert!(host.manager.get_plugin("A").await.is_none());
    // Teardown failures never disable anything
    assert!(host.flags.disabled().is_empty());
}

#[tokio::test]
async fn test_unload_only_tears_down_attempted_plugins() {
    let journal = Journal::default();
    let (second_manifest, second) = plain("Second", &journal);
    let host = test_host(
        vec![
            plain("First", &journal),
            (second_manifest, second.failing_in(LifecyclePhase::Load)),
            plain("Third", &journal),
        ],
        RunMode::Client,
    );

    let err = host.manager.load().await.unwrap_err();
    assert_eq!(err.as_plugin_system().and_then(|e| e.failed_plugin()), Some("Second"));
    assert_eq!(journal.calls("Load"), vec!["First", "Second"]);

    host.manager.unload().await.unwrap();
    assert_eq!(journal.calls("Unload"), vec!["Second", "First"]);
}

#[tokio::test]
async fn test_panicking_hook_is_contained() {
    let journal = Journal::default();
    let (manifest, plugin) = plain("Boom", &journal);
    let host = test_host(
        vec![plain("Fine", &journal), (manifest, plugin.panicking_in(LifecyclePhase::Load))],
        RunMode::Client,
    );

    let err = host.manager.load().await.unwrap_err();
    match err.as_plugin_system() {
        Some(PluginSystemError::PhaseExecution { plugin, source, .. }) => {
            assert_eq!(plugin, "Boom");
            match source {
                PluginError::Panicked { message, .. } => assert_eq!(message, "Boom blew up"),
                other => panic!("Expected Panicked, got {:?}", other),
            }
        }
        other => panic!("Expected PhaseExecution, got {:?}", other),
    }
    assert_eq!(host.manager.state(), LoaderState::Errored);
    assert_eq!(host.flags.disabled(), vec![PluginIdentity::new("boom")]);
}

#[tokio::test]
async fn test_resolution_failure_disables_errored_plugins() {
    let journal = Journal::default();
    let host = test_host(
        vec![
            depending("X", &["Y"], &journal),
            depending("Y", &["X"], &journal),
            plain("Calm", &journal),
            depending("Needy", &["Absent"], &journal),
        ],
        RunMode::Client,
    );

    let err = host.manager.load().await.unwrap_err();
    match err.as_plugin_system() {
        Some(PluginSystemError::Resolution(failure)) => {
            assert_eq!(failure.messages(), vec!["Missing plugin: Absent required by Needy".to_string()]);
        }
        other => panic!("Expected Resolution, got {:?}", other),
    }
    assert_eq!(host.manager.state(), LoaderState::Errored);
    assert_eq!(host.flags.disabled(), vec![PluginIdentity::new("needy")]);
    // No plugin code ran
    assert!(journal.entries().is_empty());

    // Next attempt finds the cycle
    let err = host.manager.reload().await.unwrap_err();
    assert!(err.to_string().contains("Dependency cycle: X -> Y -> X"), "got: {}", err);
    assert_eq!(
        host.flags.disabled(),
        vec![PluginIdentity::new("needy"), PluginIdentity::new("x"), PluginIdentity::new("y")]
    );

    let report = host.manager.reload().await.unwrap();
    assert_eq!(report.order, vec!["Host", "Calm"]);
}

#[tokio::test]
async fn test_content_tables_and_recipes() {
    let journal = Journal::default();
    let (smith_manifest, smith) = plain("Smith", &journal);
    let (armory_manifest, armory) = plain("Armory", &journal);
    let host = test_host(
        vec![
            (
                smith_manifest,
                smith
                    .with_items(&["Anvil", "Hammer"])
                    .with_hooks(&[Hook::AddRecipes]),
            ),
            (armory_manifest, armory.with_items(&["Shield"])),
        ],
        RunMode::Client,
    );

    host.manager.load().await.unwrap();

    let (size, anvil_configured) = host
        .manager
        .content(|content| {
            let anvil = content.find(ContentKind::Item, "Smith/Anvil").expect("anvil registered");
            (
                content.size(ContentKind::Item),
                content.get(anvil).and_then(|e| e.property("configured")).map(str::to_string),
            )
        })
        .await;
    assert_eq!(size, 3);
    assert_eq!(anvil_configured.as_deref(), Some("true"));

    let recipe_owners: Vec<String> = host
        .manager
        .inspect(|registry| registry.recipes().recipes().iter().map(|r| r.owner.clone()).collect())
        .await;
    assert_eq!(recipe_owners, vec!["Smith"]);
    assert_eq!(journal.calls("AddRecipes"), vec!["Smith"]);

    let implementers: Vec<String> = host
        .manager
        .hook_implementers(Hook::AddRecipes)
        .await
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(implementers, vec!["Smith"]);

    // Tables shrink back on unload and grow again on the next load
    host.manager.unload().await.unwrap();
    assert_eq!(host.manager.content(|c| c.size(ContentKind::Item)).await, 0);
    host.manager.load().await.unwrap();
    assert_eq!(host.manager.content(|c| c.size(ContentKind::Item)).await, 3);
    assert_eq!(host.manager.inspect(|r| r.recipes().len()).await, 1);
}

#[tokio::test]
async fn test_recipe_failure_does_not_disable_plugin() {
    let journal = Journal::default();
    let (manifest, plugin) = plain("Cook", &journal);
    let host = test_host(
        vec![(
            manifest,
            plugin
                .with_hooks(&[Hook::AddRecipes])
                .failing_in(LifecyclePhase::AddRecipes),
        )],
        RunMode::Client,
    );

    let err = host.manager.load().await.unwrap_err();
    assert!(matches!(err.as_plugin_system(), Some(PluginSystemError::Recipes { plugin, .. }) if plugin == "Cook"));
    assert_eq!(host.manager.state(), LoaderState::Errored);
    assert!(host.flags.disabled().is_empty());
}

#[tokio::test]
async fn test_dispatch_reaches_implementers_in_load_order() {
    let journal = Journal::default();
    let (late_manifest, late) = depending("Late", &["Early"], &journal);
    let (early_manifest, early) = plain("Early", &journal);
    let (quiet_manifest, quiet) = plain("Quiet", &journal);
    let host = test_host(
        vec![
            (late_manifest, late.with_hooks(&[Hook::PreUpdate, Hook::PostUpdate])),
            (
                early_manifest,
                early.with_hooks(&[Hook::PreUpdate]).failing_updates(),
            ),
            (quiet_manifest, quiet),
        ],
        RunMode::Client,
    );
    host.manager.load().await.unwrap();
    journal.clear();

    let failures = host.manager.dispatch(Hook::PreUpdate).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Early");
    assert_eq!(journal.calls("PreUpdate"), vec!["Early", "Late"]);

    let failures = host.manager.dispatch(Hook::PostUpdate).await.unwrap();
    assert!(failures.is_empty());
    assert_eq!(journal.calls("PostUpdate"), vec!["Late"]);
    // Runtime failures leave the session active
    assert_eq!(host.manager.state(), LoaderState::Active);
}

#[tokio::test]
async fn test_network_ids_only_on_server() {
    let journal = Journal::default();
    let server = test_host(vec![plain("Net", &journal)], RunMode::Server);
    server.manager.load().await.unwrap();
    assert_eq!(server.manager.network_id("Host").await, Some(0));
    assert_eq!(server.manager.network_id("net").await, Some(1));

    let client = test_host(vec![plain("Net", &journal)], RunMode::Client);
    client.manager.load().await.unwrap();
    assert_eq!(client.manager.network_id("Net").await, None);
}

#[tokio::test]
async fn test_side_filtered_plugins_are_skipped() {
    use crate::plugin_system::manifest::Audience;

    let journal = Journal::default();
    let client_only = ManifestBuilder::new("Hud", "1.0").side(Audience::ClientOnly).build();
    let host = test_host(
        vec![(client_only, RecordingPlugin::new("Hud", &journal)), plain("Core", &journal)],
        RunMode::Server,
    );

    let report = host.manager.load().await.unwrap();
    assert_eq!(report.order, vec!["Host", "Core"]);
    assert_eq!(report.discovery.other_side.len(), 1);
    assert!(!host.manager.is_loaded("Hud").await);
}
