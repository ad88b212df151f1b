//! Stemcells: the base images VMs boot from.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

/// File inside an extracted stemcell that describes it.
pub const STEMCELL_MANIFEST: &str = "stemcell.MF";

/// File inside an extracted stemcell holding the disk image.
pub const STEMCELL_IMAGE: &str = "image";

/// A stemcell unpacked on local disk, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedStemcell {
    pub name: String,
    pub version: String,
    /// Agent API version baked into the image. Zero for unversioned stemcells.
    pub api_version: u32,
    pub cloud_properties: Map<String, Value>,
    pub image_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct StemcellManifest {
    name: String,
    version: StemcellVersion,
    #[serde(default)]
    api_version: u32,
    #[serde(default)]
    cloud_properties: Map<String, Value>,
}

/// `version` may be written unquoted in YAML, so numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StemcellVersion {
    Text(String),
    Number(serde_yaml::Number),
}

impl ExtractedStemcell {
    /// Parse a `stemcell.MF` found in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is not valid YAML or lacks a name or version.
    pub fn from_manifest(text: &str, dir: &Path) -> Result<Self, serde_yaml::Error> {
        let manifest: StemcellManifest = serde_yaml::from_str(text)?;
        let version = match manifest.version {
            StemcellVersion::Text(v) => v,
            StemcellVersion::Number(n) => n.to_string(),
        };
        Ok(Self {
            name: manifest.name,
            version,
            api_version: manifest.api_version,
            cloud_properties: manifest.cloud_properties,
            image_path: dir.join(STEMCELL_IMAGE),
        })
    }

    /// `name/version`, as recorded in a deployment fingerprint.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// A stemcell known to the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudStemcell {
    /// Local record id.
    pub id: String,
    pub cid: String,
    pub name: String,
    pub version: String,
    pub api_version: u32,
}
