//! Deployment state persisted to `~/.microdeploy/state.json`.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! It owns the record bookkeeping for VMs, disks, and stemcells; loading and
//! saving live in `crate::infra::state`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::StateError;
use crate::domain::fingerprint::DeploymentFingerprint;

/// A persistent disk known to this deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRecord {
    /// Local record identifier, independent of the cloud CID.
    pub id: String,
    pub cid: String,
    /// Size in MiB.
    pub size: u64,
    #[serde(default)]
    pub cloud_properties: Map<String, Value>,
}

impl DiskRecord {
    /// Whether the desired shape differs from this disk.
    #[must_use]
    pub fn needs_migration(&self, size: u64, cloud_properties: &Map<String, Value>) -> bool {
        self.size != size || &self.cloud_properties != cloud_properties
    }
}

/// A stemcell uploaded to the cloud by this deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub cid: String,
    #[serde(default)]
    pub api_version: u32,
}

/// Everything the deployer remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Identity sent to the CPI as `director_uuid`.
    #[serde(default)]
    pub director_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_vm_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_disk_id: Option<String>,
    #[serde(default)]
    pub disks: Vec<DiskRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stemcell_id: Option<String>,
    #[serde(default)]
    pub stemcells: Vec<StemcellRecord>,
    /// Inputs of the last fully successful deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployment: Option<DeploymentFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl DeploymentState {
    /// Fresh state with a newly generated director identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            director_id: generate_record_id(),
            ..Self::default()
        }
    }

    /// Fill in a director identity for state files written without one.
    pub fn ensure_director_id(&mut self) {
        if self.director_id.is_empty() {
            self.director_id = generate_record_id();
        }
    }

    // ── VM ───────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn current_vm_cid(&self) -> Option<&str> {
        self.current_vm_cid.as_deref()
    }

    pub fn update_current_vm(&mut self, cid: &str) {
        self.current_vm_cid = Some(cid.to_string());
    }

    pub fn clear_current_vm(&mut self) {
        self.current_vm_cid = None;
    }

    // ── Disks ────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn find_disk(&self, cid: &str) -> Option<&DiskRecord> {
        self.disks.iter().find(|d| d.cid == cid)
    }

    /// Record a newly created disk. It is unused until promoted.
    pub fn save_disk(
        &mut self,
        cid: &str,
        size: u64,
        cloud_properties: Map<String, Value>,
    ) -> DiskRecord {
        let record = DiskRecord {
            id: generate_record_id(),
            cid: cid.to_string(),
            size,
            cloud_properties,
        };
        self.disks.push(record.clone());
        record
    }

    /// Promote the disk record `id` to current.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DiskRecordNotFound`] if no record has that id.
    pub fn update_current_disk(&mut self, id: &str) -> Result<(), StateError> {
        if !self.disks.iter().any(|d| d.id == id) {
            return Err(StateError::DiskRecordNotFound(id.to_string()));
        }
        self.current_disk_id = Some(id.to_string());
        Ok(())
    }

    /// The current disk, if one is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DanglingCurrentDisk`] if the current id points at
    /// a record that no longer exists.
    pub fn current_disk(&self) -> Result<Option<&DiskRecord>, StateError> {
        match self.current_disk_id.as_deref() {
            None => Ok(None),
            Some(id) => self
                .disks
                .iter()
                .find(|d| d.id == id)
                .map(Some)
                .ok_or_else(|| StateError::DanglingCurrentDisk(id.to_string())),
        }
    }

    /// Every disk record except the current one.
    #[must_use]
    pub fn unused_disks(&self) -> Vec<DiskRecord> {
        self.disks
            .iter()
            .filter(|d| self.current_disk_id.as_deref() != Some(d.id.as_str()))
            .cloned()
            .collect()
    }

    /// Forget a disk record. Clears the current pointer if it named this disk.
    pub fn delete_disk(&mut self, id: &str) {
        self.disks.retain(|d| d.id != id);
        if self.current_disk_id.as_deref() == Some(id) {
            self.current_disk_id = None;
        }
    }

    // ── Stemcells ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn find_stemcell(&self, name: &str, version: &str) -> Option<&StemcellRecord> {
        self.stemcells
            .iter()
            .find(|s| s.name == name && s.version == version)
    }

    pub fn save_stemcell(
        &mut self,
        name: &str,
        version: &str,
        cid: &str,
        api_version: u32,
    ) -> StemcellRecord {
        let record = StemcellRecord {
            id: generate_record_id(),
            name: name.to_string(),
            version: version.to_string(),
            cid: cid.to_string(),
            api_version,
        };
        self.stemcells.push(record.clone());
        record
    }

    /// # Errors
    ///
    /// Returns [`StateError::StemcellRecordNotFound`] if no record has that id.
    pub fn update_current_stemcell(&mut self, id: &str) -> Result<(), StateError> {
        if !self.stemcells.iter().any(|s| s.id == id) {
            return Err(StateError::StemcellRecordNotFound(id.to_string()));
        }
        self.current_stemcell_id = Some(id.to_string());
        Ok(())
    }

    #[must_use]
    pub fn current_stemcell(&self) -> Option<&StemcellRecord> {
        let id = self.current_stemcell_id.as_deref()?;
        self.stemcells.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn unused_stemcells(&self) -> Vec<StemcellRecord> {
        self.stemcells
            .iter()
            .filter(|s| self.current_stemcell_id.as_deref() != Some(s.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn delete_stemcell(&mut self, id: &str) {
        self.stemcells.retain(|s| s.id != id);
        if self.current_stemcell_id.as_deref() == Some(id) {
            self.current_stemcell_id = None;
        }
    }

    // ── Deployment record ────────────────────────────────────────────────────

    pub fn record_deployment(&mut self, fingerprint: DeploymentFingerprint, at: DateTime<Utc>) {
        self.last_deployment = Some(fingerprint);
        self.last_deployed_at = Some(at);
    }

    pub fn clear_deployment(&mut self) {
        self.last_deployment = None;
        self.last_deployed_at = None;
    }
}

/// Generate a unique record identifier: 16 lowercase hex characters.
///
/// Entropy sources: nanosecond timestamp and two independent `RandomState` hashes.
#[must_use]
pub fn generate_record_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.write_u64(RandomState::new().build_hasher().finish());
    hasher.write_u64(RandomState::new().build_hasher().finish());
    format!("{:016x}", hasher.finish())
}
