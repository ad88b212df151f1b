//! Identity of a deployment's inputs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Manifest digest plus stemcell and release identities.
///
/// Two fingerprints are equal exactly when a redeploy would change nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFingerprint {
    pub manifest_sha256: String,
    /// `name/version` of the stemcell.
    pub stemcell: String,
    /// Sorted `name/version` of every release.
    pub releases: Vec<String>,
}

impl DeploymentFingerprint {
    #[must_use]
    pub fn new(manifest: &[u8], stemcell: String, mut releases: Vec<String>) -> Self {
        releases.sort();
        releases.dedup();
        Self {
            manifest_sha256: sha256_hex(manifest),
            stemcell,
            releases,
        }
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

/// Encode bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
