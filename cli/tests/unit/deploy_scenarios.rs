//! Multi-run deploy scenarios through the public service API.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use microdeploy_cli::application::services::deploy::{
    DeployInput, DeployOptions, DeployOutcome, deploy,
};
use microdeploy_cli::domain::{DeploymentManifest, ReleaseArtifacts};

use crate::mocks::{
    InMemoryAgent, InMemoryCloud, InMemoryStore, MANIFEST, SilentReporter, fast_config,
    manifest_with_disk, stemcell,
};

async fn run(
    cloud: &InMemoryCloud,
    agent: &InMemoryAgent,
    store: &InMemoryStore,
    text: &str,
) -> anyhow::Result<DeployOutcome> {
    let manifest = DeploymentManifest::parse(text).expect("manifest parses");
    let config = fast_config();
    deploy(
        cloud,
        agent,
        store,
        DeployInput {
            manifest_text: text,
            manifest: &manifest,
            stemcell: &stemcell(),
            artifacts: &ReleaseArtifacts::default(),
        },
        DeployOptions {
            reporter: &SilentReporter,
            config: &config,
        },
    )
    .await
}

fn disk_of(outcome: DeployOutcome) -> String {
    match outcome {
        DeployOutcome::Deployed {
            disk_cid: Some(cid),
            ..
        } => cid,
        other => panic!("expected a deploy with a disk, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn resize_migrates_data_then_settles() {
    let (cloud, agent, store) = (
        InMemoryCloud::default(),
        InMemoryAgent::default(),
        InMemoryStore::default(),
    );

    let first = disk_of(run(&cloud, &agent, &store, MANIFEST).await.unwrap());
    assert_eq!(cloud.disks.borrow().get(&first), Some(&1024));

    let bigger = manifest_with_disk(2048);
    let second = disk_of(run(&cloud, &agent, &store, &bigger).await.unwrap());
    assert_ne!(first, second);
    assert_eq!(agent.migrations.get(), 1);
    // The old disk is deleted once the deploy converges.
    assert!(!cloud.disks.borrow().contains_key(&first));
    assert_eq!(cloud.disks.borrow().get(&second), Some(&2048));

    let state = store.snapshot();
    assert_eq!(state.disks.len(), 1);
    assert_eq!(state.current_disk().unwrap().unwrap().cid, second);

    let calls = cloud.total_calls();
    let outcome = run(&cloud, &agent, &store, &bigger).await.unwrap();
    assert_eq!(outcome, DeployOutcome::NoChanges);
    assert_eq!(cloud.total_calls(), calls, "an unchanged redeploy must not reach the cloud");
}

#[tokio::test(start_paused = true)]
async fn failed_migration_keeps_both_disks() {
    let (cloud, agent, store) = (
        InMemoryCloud::default(),
        InMemoryAgent::default(),
        InMemoryStore::default(),
    );
    let first = disk_of(run(&cloud, &agent, &store, MANIFEST).await.unwrap());
    let deployed = store.snapshot().last_deployment;
    assert!(deployed.is_some());

    agent.fail_migration.set(true);
    let err = run(&cloud, &agent, &store, &manifest_with_disk(2048))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("no space left"), "got: {err:#}");

    let state = store.snapshot();
    assert_eq!(state.disks.len(), 2);
    assert_eq!(state.current_disk().unwrap().unwrap().cid, first);
    assert_eq!(cloud.disks.borrow().len(), 2);
    assert_eq!(state.last_deployment, deployed);
}

#[tokio::test(start_paused = true)]
async fn retry_after_failed_migration_finishes_the_move() {
    let (cloud, agent, store) = (
        InMemoryCloud::default(),
        InMemoryAgent::default(),
        InMemoryStore::default(),
    );
    run(&cloud, &agent, &store, MANIFEST).await.unwrap();
    let bigger = manifest_with_disk(2048);

    agent.fail_migration.set(true);
    run(&cloud, &agent, &store, &bigger).await.unwrap_err();
    agent.fail_migration.set(false);
    let current = disk_of(run(&cloud, &agent, &store, &bigger).await.unwrap());

    let state = store.snapshot();
    assert_eq!(state.disks.len(), 1);
    assert_eq!(state.disks[0].cid, current);
    assert_eq!(state.disks[0].size, 2048);
}

#[tokio::test(start_paused = true)]
async fn vanished_disk_is_replaced_with_a_fresh_one() {
    let (cloud, agent, store) = (
        InMemoryCloud::default(),
        InMemoryAgent::default(),
        InMemoryStore::default(),
    );
    let first = disk_of(run(&cloud, &agent, &store, MANIFEST).await.unwrap());
    cloud.lose_disk(&first);

    let changed = MANIFEST.replace("name: scenario", "name: scenario\nproperties: {x: 1}");
    let second = disk_of(run(&cloud, &agent, &store, &changed).await.unwrap());
    assert_ne!(first, second);
    assert_eq!(agent.migrations.get(), 0);

    let state = store.snapshot();
    assert!(state.find_disk(&first).is_none());
    assert_eq!(state.current_disk().unwrap().unwrap().cid, second);
}

#[tokio::test(start_paused = true)]
async fn cloud_failure_leaves_deployment_unrecorded() {
    let (cloud, agent, store) = (
        InMemoryCloud::default(),
        InMemoryAgent::default(),
        InMemoryStore::default(),
    );
    cloud.break_method("create_disk");
    let err = run(&cloud, &agent, &store, MANIFEST).await.unwrap_err();
    assert!(format!("{err:#}").contains("create_disk"), "got: {err:#}");

    let state = store.snapshot();
    assert!(state.last_deployment.is_none());
    // The VM made it into the records before the failure.
    assert!(state.current_vm_cid().is_some());
}
