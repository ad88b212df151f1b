//! Disk migration engine.
//!
//! Keeps the job's persistent disk in the shape the manifest asks for. A
//! changed size or cloud properties means a new disk is created, the agent
//! copies the data across, and the old disk is left unused. Unused disks are
//! only deleted by [`delete_unused`], which the deploy runs last; a migration
//! that fails half-way is cleaned up by the next successful deploy.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::application::ports::{AgentClient, Cloud, DeploymentStateStore, ProgressReporter};
use crate::application::services::records::Records;
use crate::domain::{DeployError, DiskRecord, DiskSpec, Vm};

pub struct DiskOptions<'a, R: ProgressReporter> {
    pub reporter: &'a R,
    /// Unused disks tolerated before a migration must clean up first.
    pub max_unused: usize,
}

/// Bring the VM's persistent disk in line with `desired`.
///
/// A zero size means the job has no persistent disk and nothing is done.
///
/// # Errors
///
/// Returns an error naming the failed step. A failed data copy leaves the
/// old disk current and the new disk recorded as unused.
pub async fn update<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    vm: &Vm,
    desired: &DiskSpec,
    opts: DiskOptions<'_, impl ProgressReporter>,
) -> Result<()> {
    if desired.size == 0 {
        debug!("No persistent disk requested");
        return Ok(());
    }
    let reporter = opts.reporter;

    let current = records
        .state()
        .current_disk()
        .context("Finding current disk")?
        .cloned();
    let current = match current {
        Some(disk) => attach_existing(cloud, agent, records, vm, disk, reporter).await?,
        None => None,
    };

    match current {
        None => {
            let disk = create_and_attach(cloud, agent, records, vm, desired, reporter).await?;
            records
                .update(|s| s.update_current_disk(&disk.id))
                .await?
                .context("Updating current disk record")?;
            Ok(())
        }
        Some(disk) if disk.needs_migration(desired.size, &desired.cloud_properties) => {
            migrate(cloud, agent, records, vm, &disk, desired, opts).await
        }
        Some(_) => Ok(()),
    }
}

/// Attach and mount the recorded current disk.
///
/// Returns `None` when the cloud no longer knows the disk; its record is
/// dropped and the caller proceeds as if there never was one.
async fn attach_existing<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    vm: &Vm,
    disk: DiskRecord,
    reporter: &impl ProgressReporter,
) -> Result<Option<DiskRecord>> {
    reporter.step(&format!(
        "attaching disk '{}' to VM '{}'...",
        disk.cid,
        vm.cid()
    ));
    match cloud
        .attach_disk(vm.cid(), &disk.cid, vm.stemcell_api_version())
        .await
    {
        Ok(()) => {}
        Err(err) if err.is_disk_not_found() => {
            warn!(cid = %disk.cid, "Current disk no longer exists, forgetting it");
            reporter.warn(&format!(
                "disk '{}' not found in the cloud, a new disk will be created",
                disk.cid
            ));
            records.update(|s| s.delete_disk(&disk.id)).await?;
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Attaching disk '{}' to VM '{}'", disk.cid, vm.cid())
            });
        }
    }
    mount(agent, &disk).await?;
    Ok(Some(disk))
}

async fn create_and_attach<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    vm: &Vm,
    desired: &DiskSpec,
    reporter: &impl ProgressReporter,
) -> Result<DiskRecord> {
    reporter.step(&format!("creating disk of {} MiB...", desired.size));
    let cid = cloud
        .create_disk(desired.size, &desired.cloud_properties, vm.cid())
        .await
        .context("Creating disk")?;
    let disk = records
        .update(|s| s.save_disk(&cid, desired.size, desired.cloud_properties.clone()))
        .await?;
    info!(cid = %disk.cid, size = disk.size, "Disk created");

    reporter.step(&format!(
        "attaching disk '{}' to VM '{}'...",
        disk.cid,
        vm.cid()
    ));
    cloud
        .attach_disk(vm.cid(), &disk.cid, vm.stemcell_api_version())
        .await
        .with_context(|| format!("Attaching disk '{}' to VM '{}'", disk.cid, vm.cid()))?;
    mount(agent, &disk).await?;
    Ok(disk)
}

async fn mount(agent: &impl AgentClient, disk: &DiskRecord) -> Result<()> {
    agent
        .mount_disk(&disk.cid)
        .await
        .with_context(|| format!("Mounting disk '{}'", disk.cid))
}

async fn migrate<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    agent: &impl AgentClient,
    records: &mut Records<'_, S>,
    vm: &Vm,
    old: &DiskRecord,
    desired: &DiskSpec,
    opts: DiskOptions<'_, impl ProgressReporter>,
) -> Result<()> {
    let reporter = opts.reporter;
    debug!(cid = %old.cid, "Migrating disk");
    enforce_unused_limit(cloud, records, opts.max_unused, reporter).await?;

    let new = create_and_attach(cloud, agent, records, vm, desired, reporter).await?;

    reporter.step(&format!(
        "migrating disk content from '{}' to '{}'...",
        old.cid, new.cid
    ));
    agent.migrate_disk().await.with_context(|| {
        format!(
            "Migrating disk content from '{}' to '{}'",
            old.cid, new.cid
        )
    })?;

    let mounted = agent
        .list_disk()
        .await
        .context("Listing mounted disks")?;
    if mounted.contains(&old.cid) {
        agent
            .unmount_disk(&old.cid)
            .await
            .with_context(|| format!("Unmounting disk '{}'", old.cid))?;
    }

    reporter.step(&format!("detaching disk '{}'...", old.cid));
    match cloud
        .detach_disk(vm.cid(), &old.cid, vm.stemcell_api_version())
        .await
    {
        Ok(()) => {}
        Err(err) if err.is_disk_not_found() => {
            warn!(cid = %old.cid, "Old disk already gone");
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Detaching disk '{}' from VM '{}'", old.cid, vm.cid()));
        }
    }

    records
        .update(|s| s.update_current_disk(&new.id))
        .await?
        .context("Updating current disk record")?;
    reporter.success(&format!("disk migrated to '{}'", new.cid));
    Ok(())
}

async fn enforce_unused_limit<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    limit: usize,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let count = records.state().unused_disks().len();
    if count < limit {
        return Ok(());
    }
    warn!(count, limit, "Too many unused disks, cleaning up before migrating");
    delete_unused(cloud, records, reporter)
        .await
        .map_err(|e| e.context(DeployError::UnusedDiskLimit { count, limit }))
}

/// Delete every disk that is not current.
///
/// Every disk is attempted even if an earlier one fails.
///
/// # Errors
///
/// Returns [`DeployError::UnusedDiskCleanup`] if any disk could not be deleted.
pub async fn delete_unused<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let disks = records.state().unused_disks();
    delete_disks(cloud, records, disks, reporter).await
}

/// Delete every recorded disk, including the current one.
///
/// # Errors
///
/// Returns [`DeployError::UnusedDiskCleanup`] if any disk could not be deleted.
pub async fn delete_all<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let disks = records.state().disks.clone();
    delete_disks(cloud, records, disks, reporter).await
}

async fn delete_disks<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    disks: Vec<DiskRecord>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let total = disks.len();
    let mut failed = 0;
    for disk in disks {
        reporter.step(&format!("deleting disk '{}'...", disk.cid));
        match cloud.delete_disk(&disk.cid).await {
            Ok(()) => {}
            Err(err) if err.is_disk_not_found() => {
                warn!(cid = %disk.cid, "Disk already gone");
            }
            Err(err) => {
                warn!(cid = %disk.cid, error = %err, "Failed to delete disk");
                reporter.warn(&format!("failed to delete disk '{}': {err}", disk.cid));
                failed += 1;
                continue;
            }
        }
        records.update(|s| s.delete_disk(&disk.id)).await?;
    }
    if failed > 0 {
        return Err(DeployError::UnusedDiskCleanup { failed, total }.into());
    }
    Ok(())
}
