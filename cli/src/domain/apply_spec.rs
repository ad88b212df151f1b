//! The spec handed to the agent's `apply` method.
//!
//! Job templates and packages are compiled and uploaded to the agent's
//! blobstore elsewhere; this module only assembles the references into the
//! document the agent expects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::domain::fingerprint::sha256_hex;
use crate::domain::manifest::{DeploymentManifest, Job};

/// A blob already present in the agent's blobstore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub name: String,
    pub version: String,
    pub sha1: String,
    pub blobstore_id: String,
}

/// Compiled outputs for one deploy, read from the artifacts file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifacts {
    #[serde(default)]
    pub templates: Vec<BlobRef>,
    #[serde(default)]
    pub packages: BTreeMap<String, BlobRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_templates_archive: Option<RenderedTemplatesArchive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplatesArchive {
    pub blobstore_id: String,
    pub sha1: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplySpec {
    pub deployment: String,
    pub index: u32,
    pub job: ApplyJob,
    pub packages: BTreeMap<String, BlobRef>,
    pub networks: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_templates_archive: Option<RenderedTemplatesArchive>,
    pub configuration_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_disk: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyJob {
    pub name: String,
    pub templates: Vec<BlobRef>,
}

impl ApplySpec {
    /// Assemble the apply spec for `job`.
    ///
    /// `configuration_hash` covers the job and global properties together with
    /// the rendered archive digest, so a property change forces the agent to
    /// re-render.
    #[must_use]
    pub fn build(
        manifest: &DeploymentManifest,
        job: &Job,
        networks: Map<String, Value>,
        persistent_disk_size: u64,
        artifacts: &ReleaseArtifacts,
    ) -> Self {
        let hashed = json!({
            "job_properties": job.properties,
            "properties": manifest.properties,
            "rendered_templates_archive": artifacts.rendered_templates_archive,
        });
        Self {
            deployment: manifest.name.clone(),
            index: 0,
            job: ApplyJob {
                name: job.name.clone(),
                templates: artifacts.templates.clone(),
            },
            packages: artifacts.packages.clone(),
            networks,
            rendered_templates_archive: artifacts.rendered_templates_archive.clone(),
            configuration_hash: sha256_hex(hashed.to_string().as_bytes()),
            persistent_disk: (persistent_disk_size > 0).then_some(persistent_disk_size),
        }
    }
}
