//! Application service: deploy and delete use-cases.
//!
//! Runs the whole sequence for one single-instance deployment: stemcell, VM,
//! disk, agent convergence, cleanup. Nothing is recorded as deployed unless
//! every step succeeds, so a failed run is always retried in full.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::application::ports::{AgentClient, Cloud, DeploymentStateStore, ProgressReporter};
use crate::application::services::disk::{self, DiskOptions};
use crate::application::services::records::Records;
use crate::application::services::vm::lifecycle::{self as vm, CreateOptions};
use crate::application::services::{deployment_record, stemcell};
use crate::domain::{
    ApplySpec, DeployerConfig, DeploymentFingerprint, DeploymentManifest, ExtractedStemcell,
    ReleaseArtifacts,
};

/// Everything a deploy reads.
pub struct DeployInput<'a> {
    /// Raw manifest text, hashed into the deployment fingerprint.
    pub manifest_text: &'a str,
    pub manifest: &'a DeploymentManifest,
    pub stemcell: &'a ExtractedStemcell,
    pub artifacts: &'a ReleaseArtifacts,
}

pub struct DeployOptions<'a, R: ProgressReporter> {
    pub reporter: &'a R,
    pub config: &'a DeployerConfig,
}

/// Outcome of the `deploy` use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Manifest, stemcell and releases match the last successful deploy.
    NoChanges,
    Deployed {
        vm_cid: String,
        disk_cid: Option<String>,
    },
}

/// Deploy `input`, skipping all cloud work when nothing changed.
///
/// # Errors
///
/// Returns an error naming the step that failed.
pub async fn deploy(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    store: &impl DeploymentStateStore,
    input: DeployInput<'_>,
    opts: DeployOptions<'_, impl ProgressReporter>,
) -> Result<DeployOutcome> {
    let DeployOptions { reporter, config } = opts;
    let DeployInput {
        manifest_text,
        manifest,
        stemcell: extracted,
        artifacts,
    } = input;

    let job = manifest.job()?;
    let watch = manifest.watch_time()?;
    let desired_disk = manifest.disk_spec(job)?;
    let networks = manifest.network_interfaces(job)?;

    let fingerprint = DeploymentFingerprint::new(
        manifest_text.as_bytes(),
        extracted.identity(),
        manifest.release_identities(),
    );
    let mut records = Records::load(store).await?;
    if deployment_record::is_deployed(records.state(), &fingerprint) {
        info!(deployment = %manifest.name, "No changes since the last deploy");
        reporter.success("no changes since the last deploy, skipping");
        return Ok(DeployOutcome::NoChanges);
    }

    info!(stage = "validating cpi", "Starting stage");
    let cpi = cloud.info().await.context("Getting CPI info")?;
    info!(
        api_version = cpi.api_version,
        formats = ?cpi.stemcell_formats,
        "CPI info"
    );

    info!(stage = "uploading stemcell", "Starting stage");
    let uploaded = stemcell::upload(cloud, &mut records, extracted, reporter).await?;

    info!(stage = "deploying", "Starting stage");
    if let Some(mut existing) = vm::find_current(records.state()) {
        vm::delete(
            cloud,
            agent,
            &mut records,
            &mut existing,
            &config.retry,
            reporter,
        )
        .await?;
    }
    let mut new_vm = vm::create(
        cloud,
        agent,
        &mut records,
        CreateOptions {
            reporter,
            manifest,
            job,
            stemcell: &uploaded,
            retry: &config.retry,
        },
    )
    .await?;
    stemcell::promote(&mut records, &uploaded).await?;

    disk::update(
        cloud,
        agent,
        &mut records,
        &new_vm,
        &desired_disk,
        DiskOptions {
            reporter,
            max_unused: config.disks.max_unused,
        },
    )
    .await?;

    let spec = ApplySpec::build(manifest, job, networks, desired_disk.size, artifacts);
    vm::apply(agent, &mut new_vm, &spec, reporter).await?;
    vm::start(agent, &mut new_vm, watch, &config.retry, reporter).await?;

    info!(stage = "cleaning up", "Starting stage");
    disk::delete_unused(cloud, &mut records, reporter)
        .await
        .context("Deleting unused disks")?;
    stemcell::delete_unused(cloud, &mut records, reporter)
        .await
        .context("Deleting unused stemcells")?;

    deployment_record::update(&mut records, fingerprint, Utc::now()).await?;
    let disk_cid = records
        .state()
        .current_disk()?
        .map(|d| d.cid.clone());
    reporter.success(&format!("deployment '{}' is running", manifest.name));
    Ok(DeployOutcome::Deployed {
        vm_cid: new_vm.cid().to_string(),
        disk_cid,
    })
}

/// Tear the deployment down: VM, disks, stemcells, then the deployment record.
///
/// # Errors
///
/// Returns an error naming the step that failed. Records of resources that
/// were already deleted are kept deleted, so the command can be re-run.
pub async fn delete(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    store: &impl DeploymentStateStore,
    opts: DeployOptions<'_, impl ProgressReporter>,
) -> Result<()> {
    let DeployOptions { reporter, config } = opts;
    let mut records = Records::load(store).await?;

    cloud.info().await.context("Getting CPI info")?;
    if let Some(mut existing) = vm::find_current(records.state()) {
        vm::delete(
            cloud,
            agent,
            &mut records,
            &mut existing,
            &config.retry,
            reporter,
        )
        .await?;
    }
    disk::delete_all(cloud, &mut records, reporter)
        .await
        .context("Deleting disks")?;
    stemcell::delete_all(cloud, &mut records, reporter)
        .await
        .context("Deleting stemcells")?;
    records.update(|s| s.clear_deployment()).await?;
    reporter.success("deployment deleted");
    Ok(())
}
