//! Filesystem infrastructure: reads the inputs of a deploy from disk.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::stemcell::STEMCELL_MANIFEST;
use crate::domain::{DeploymentManifest, ExtractedStemcell, ReleaseArtifacts};

/// A deployment manifest together with the exact text it was parsed from.
pub struct ManifestFile {
    pub text: String,
    pub manifest: DeploymentManifest,
}

/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid manifest.
pub fn read_manifest(path: &Path) -> Result<ManifestFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest = DeploymentManifest::parse(&text)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(ManifestFile { text, manifest })
}

/// Read an extracted stemcell directory (`stemcell.MF` plus `image`).
///
/// # Errors
///
/// Returns an error if the stemcell manifest is missing or invalid, or the
/// image file does not exist.
pub fn read_stemcell(dir: &Path) -> Result<ExtractedStemcell> {
    let manifest_path = dir.join(STEMCELL_MANIFEST);
    let text = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("reading stemcell manifest {}", manifest_path.display()))?;
    let stemcell = ExtractedStemcell::from_manifest(&text, dir)
        .with_context(|| format!("parsing stemcell manifest {}", manifest_path.display()))?;
    anyhow::ensure!(
        stemcell.image_path.is_file(),
        "stemcell image {} not found",
        stemcell.image_path.display()
    );
    Ok(stemcell)
}

/// Read compiled release artifacts. No path means no artifacts.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_artifacts(path: Option<&Path>) -> Result<ReleaseArtifacts> {
    let Some(path) = path else {
        return Ok(ReleaseArtifacts::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading release artifacts {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("parsing release artifacts {}", path.display()))
}
