//! Stemcell manager: upload, promote and clean up base images.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use tracing::warn;

use crate::application::ports::{Cloud, DeploymentStateStore, ProgressReporter};
use crate::application::services::records::Records;
use crate::domain::{CloudStemcell, ExtractedStemcell, StemcellRecord};

fn to_cloud(record: StemcellRecord) -> CloudStemcell {
    CloudStemcell {
        id: record.id,
        cid: record.cid,
        name: record.name,
        version: record.version,
        api_version: record.api_version,
    }
}

/// Make `extracted` available in the cloud.
///
/// A stemcell with the same name and version that was uploaded before is
/// reused without calling the CPI.
///
/// # Errors
///
/// Returns an error if the CPI upload fails or the record cannot be saved.
pub async fn upload<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    extracted: &ExtractedStemcell,
    reporter: &impl ProgressReporter,
) -> Result<CloudStemcell> {
    if let Some(existing) = records
        .state()
        .find_stemcell(&extracted.name, &extracted.version)
    {
        reporter.success(&format!(
            "stemcell '{}' already uploaded",
            extracted.identity()
        ));
        return Ok(to_cloud(existing.clone()));
    }

    reporter.step(&format!("uploading stemcell '{}'...", extracted.identity()));
    let cid = cloud
        .create_stemcell(&extracted.image_path, &extracted.cloud_properties)
        .await
        .with_context(|| format!("Creating stemcell '{}'", extracted.identity()))?;
    let record = records
        .update(|s| {
            s.save_stemcell(
                &extracted.name,
                &extracted.version,
                &cid,
                extracted.api_version,
            )
        })
        .await?;
    reporter.success(&format!("stemcell uploaded as '{cid}'"));
    Ok(to_cloud(record))
}

/// Mark `stemcell` as the one the current VM runs.
///
/// # Errors
///
/// Returns an error if the record is unknown or cannot be saved.
pub async fn promote<S: DeploymentStateStore>(
    records: &mut Records<'_, S>,
    stemcell: &CloudStemcell,
) -> Result<()> {
    records
        .update(|s| s.update_current_stemcell(&stemcell.id))
        .await?
        .context("Updating current stemcell record")?;
    Ok(())
}

/// Delete every stemcell that is not current.
///
/// # Errors
///
/// Returns an error if the CPI fails to delete a stemcell for any reason
/// other than it already being gone.
pub async fn delete_unused<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    for stemcell in records.state().unused_stemcells() {
        delete_one(cloud, records, &stemcell, reporter).await?;
    }
    Ok(())
}

/// Delete every stemcell, current or not.
///
/// # Errors
///
/// Returns an error on the first stemcell the CPI fails to delete.
pub async fn delete_all<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    for stemcell in records.state().stemcells.clone() {
        delete_one(cloud, records, &stemcell, reporter).await?;
    }
    Ok(())
}

async fn delete_one<S: DeploymentStateStore>(
    cloud: &impl Cloud,
    records: &mut Records<'_, S>,
    stemcell: &StemcellRecord,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    reporter.step(&format!(
        "deleting stemcell '{}/{}' ({})...",
        stemcell.name, stemcell.version, stemcell.cid
    ));
    match cloud.delete_stemcell(&stemcell.cid).await {
        Ok(()) => {}
        Err(err) if err.is_stemcell_not_found() => {
            warn!(cid = %stemcell.cid, "Stemcell already gone");
            reporter.warn(&format!("stemcell '{}' not found in the cloud", stemcell.cid));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Deleting stemcell '{}'", stemcell.cid));
        }
    }
    records.update(|s| s.delete_stemcell(&stemcell.id)).await
}
