//! VM lifecycle operations: find, create, apply, start, delete.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::application::ports::{
    AgentClient, Cloud, CreateVmRequest, DeploymentStateStore, ProgressReporter,
};
use crate::application::services::records::Records;
use crate::application::services::retry::{
    AttemptRetryStrategy, GetStateRetryable, PingRetryable, TimeoutRetryStrategy,
};
use crate::domain::config::RetryConfig;
use crate::domain::manifest::{DeploymentManifest, Job, WatchTime};
use crate::domain::state::generate_record_id;
use crate::domain::{ApplySpec, CloudStemcell, DeploymentState, Vm, VmState};

/// Value of the `director` metadata key on every VM this tool creates.
pub const DIRECTOR_NAME: &str = "microdeploy";

/// The VM recorded as current, if any.
///
/// Its stemcell API version comes from the current stemcell record; VMs
/// recorded without one are addressed as unversioned.
#[must_use]
pub fn find_current(state: &DeploymentState) -> Option<Vm> {
    let cid = state.current_vm_cid()?;
    let api_version = state.current_stemcell().map_or(0, |s| s.api_version);
    Some(Vm::existing(cid, api_version))
}

pub struct CreateOptions<'a, R: ProgressReporter> {
    pub reporter: &'a R,
    pub manifest: &'a DeploymentManifest,
    pub job: &'a Job,
    pub stemcell: &'a CloudStemcell,
    pub retry: &'a RetryConfig,
}

/// Create the job's VM and wait until its agent answers.
///
/// The VM is recorded as current as soon as the CPI returns its CID, so a
/// later failure in this function never leaks it.
///
/// # Errors
///
/// Returns an error if the CPI fails to create or tag the VM, or the agent
/// does not answer a ping within the configured timeout.
pub async fn create<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    opts: CreateOptions<'_, impl ProgressReporter>,
) -> Result<Vm> {
    let CreateOptions {
        reporter,
        manifest,
        job,
        stemcell,
        retry,
    } = opts;

    let cloud_properties = &manifest.resource_pool(job)?.cloud_properties;
    let networks = manifest.network_interfaces(job)?;
    let env = manifest.vm_env(job)?;
    let agent_id = generate_record_id();

    reporter.step(&format!("creating VM for instance '{}/0'...", job.name));
    let cid = cloud
        .create_vm(&CreateVmRequest {
            agent_id: &agent_id,
            stemcell_cid: &stemcell.cid,
            stemcell_api_version: stemcell.api_version,
            cloud_properties,
            networks: &networks,
            env: &env,
        })
        .await
        .with_context(|| format!("Creating VM with agent ID '{agent_id}'"))?;
    records.update(|s| s.update_current_vm(&cid)).await?;
    let mut vm = Vm::created(cid, stemcell.api_version);
    debug!(cid = vm.cid(), agent_id, "VM created");

    let metadata = vm_metadata(manifest, job);
    match cloud
        .set_vm_metadata(vm.cid(), &metadata, vm.stemcell_api_version())
        .await
    {
        Ok(()) => {}
        Err(err) if err.is_not_implemented() => {
            debug!(cid = vm.cid(), "CPI does not implement set_vm_metadata");
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Setting metadata on VM '{}'", vm.cid()));
        }
    }

    reporter.step(&format!("waiting for the agent on VM '{}'...", vm.cid()));
    TimeoutRetryStrategy::new(retry.ping_timeout(), retry.ping_delay())
        .run(&mut PingRetryable::new(agent))
        .await
        .with_context(|| format!("Waiting for the agent on VM '{}'", vm.cid()))?;
    vm.transition(VmState::Ready)?;
    reporter.success(&format!("VM '{}' ready", vm.cid()));
    Ok(vm)
}

/// Metadata tagged onto a freshly created VM.
#[must_use]
pub fn vm_metadata(manifest: &DeploymentManifest, job: &Job) -> BTreeMap<String, String> {
    let mut metadata: BTreeMap<String, String> = manifest.tags.clone();
    for (key, value) in [
        ("deployment", manifest.name.clone()),
        ("job", job.name.clone()),
        ("instance_group", job.name.clone()),
        ("index", "0".to_string()),
        ("director", DIRECTOR_NAME.to_string()),
        ("name", format!("{}/0", job.name)),
        (
            "created_at",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
    ] {
        metadata.insert(key.to_string(), value);
    }
    metadata
}

/// Stop the jobs and hand the agent a new apply spec.
///
/// # Errors
///
/// Returns an error if the VM is not in a state that accepts a spec or the
/// agent rejects either call.
pub async fn apply(
    agent: &impl AgentClient,
    vm: &mut Vm,
    spec: &ApplySpec,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    reporter.step(&format!("updating instance '{}/0'...", spec.job.name));
    agent
        .stop()
        .await
        .with_context(|| format!("Stopping jobs on VM '{}'", vm.cid()))?;
    agent
        .apply(spec)
        .await
        .with_context(|| format!("Sending apply message to VM '{}'", vm.cid()))?;
    vm.transition(VmState::Applying)?;
    Ok(())
}

/// Start the jobs and poll until the agent reports them running.
///
/// Waits `watch.start_ms` before the first poll, then polls up to
/// `watch.attempts(..)` times.
///
/// # Errors
///
/// Returns an error if the agent refuses to start, or the jobs are not
/// running before attempts run out. The error names the last observed state.
pub async fn start(
    agent: &impl AgentClient,
    vm: &mut Vm,
    watch: WatchTime,
    retry: &RetryConfig,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    agent
        .start()
        .await
        .with_context(|| format!("Starting jobs on VM '{}'", vm.cid()))?;
    vm.transition(VmState::Starting)?;

    reporter.step("waiting for jobs to be running...");
    tokio::time::sleep(Duration::from_millis(watch.start_ms)).await;
    let attempts = watch.attempts(retry.get_state_delay_ms);
    let mut retryable = GetStateRetryable::new(agent);
    let outcome = AttemptRetryStrategy::new(attempts, retry.get_state_delay())
        .run(&mut retryable)
        .await;
    if let Err(err) = outcome {
        let last = retryable.last_state().unwrap_or("unknown");
        return Err(err).with_context(|| {
            format!(
                "Waiting for jobs on VM '{}' to be running (last state: '{last}')",
                vm.cid()
            )
        });
    }
    vm.transition(VmState::Running)?;
    reporter.success("jobs running");
    Ok(())
}

/// Delete `vm` and forget it.
///
/// When the VM still exists and its agent answers a short ping, jobs are
/// stopped and mounted disks unmounted first. An unreachable agent or a VM
/// the cloud no longer knows is not an error.
///
/// # Errors
///
/// Returns an error if a graceful shutdown step or the CPI deletion fails.
pub async fn delete<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    vm: &mut Vm,
    retry: &RetryConfig,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    vm.transition(VmState::Deleting)?;
    let cid = vm.cid().to_string();
    let api_version = vm.stemcell_api_version();

    let exists = cloud
        .has_vm(&cid, api_version)
        .await
        .with_context(|| format!("Checking for VM '{cid}'"))?;
    if exists {
        let reachable =
            TimeoutRetryStrategy::new(retry.delete_ping_timeout(), retry.delete_ping_delay())
                .run(&mut PingRetryable::new(agent))
                .await;
        match reachable {
            Ok(()) => shut_down(agent, &cid, reporter).await?,
            Err(err) => {
                warn!(cid, error = %err, "Agent unreachable, deleting VM without stopping jobs");
                reporter.warn(&format!("agent on VM '{cid}' is unreachable, skipping shutdown"));
            }
        }
    }

    reporter.step(&format!("deleting VM '{cid}'..."));
    match cloud.delete_vm(&cid, api_version).await {
        Ok(()) => {}
        Err(err) if err.is_vm_not_found() => {
            warn!(cid, "VM already gone");
        }
        Err(err) => return Err(err).with_context(|| format!("Deleting VM '{cid}'")),
    }
    records.update(DeploymentState::clear_current_vm).await?;
    vm.transition(VmState::Absent)?;
    reporter.success(&format!("VM '{cid}' deleted"));
    Ok(())
}

async fn shut_down(
    agent: &impl AgentClient,
    cid: &str,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    reporter.step(&format!("stopping jobs on VM '{cid}'..."));
    agent
        .stop()
        .await
        .with_context(|| format!("Stopping jobs on VM '{cid}'"))?;
    let disks = agent
        .list_disk()
        .await
        .with_context(|| format!("Listing disks on VM '{cid}'"))?;
    for disk_cid in disks {
        reporter.step(&format!("unmounting disk '{disk_cid}'..."));
        agent
            .unmount_disk(&disk_cid)
            .await
            .with_context(|| format!("Unmounting disk '{disk_cid}' from VM '{cid}'"))?;
    }
    Ok(())
}
