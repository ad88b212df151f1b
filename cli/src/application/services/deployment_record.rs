//! Idempotency gate: skip a deploy whose inputs match the last success.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::application::ports::DeploymentStateStore;
use crate::application::services::records::Records;
use crate::domain::{DeploymentFingerprint, DeploymentState};

/// Whether the manifest, stemcell and releases all match the last recorded deploy.
#[must_use]
pub fn is_deployed(state: &DeploymentState, fingerprint: &DeploymentFingerprint) -> bool {
    state.last_deployment.as_ref() == Some(fingerprint)
}

/// Record `fingerprint` as deployed. Call only once every deploy step succeeded.
///
/// # Errors
///
/// Returns an error if the state cannot be saved.
pub async fn update<S: DeploymentStateStore>(
    records: &mut Records<'_, S>,
    fingerprint: DeploymentFingerprint,
    at: DateTime<Utc>,
) -> Result<()> {
    records
        .update(|s| s.record_deployment(fingerprint, at))
        .await
}
