//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod apply_spec;
pub mod config;
pub mod cpi;
pub mod error;
pub mod fingerprint;
pub mod manifest;
pub mod state;
pub mod stemcell;
pub mod vm;

pub use apply_spec::{ApplySpec, ReleaseArtifacts};
pub use config::DeployerConfig;
pub use cpi::{CpiErrorKind, CpiInfo};
pub use error::{
    AgentError, CloudError, ConfigError, DeployError, ManifestError, RetryError, StateError,
};
pub use fingerprint::DeploymentFingerprint;
pub use manifest::{DeploymentManifest, DiskSpec, WatchTime};
pub use state::{DeploymentState, DiskRecord, StemcellRecord};
pub use stemcell::{CloudStemcell, ExtractedStemcell};
pub use vm::{Vm, VmState};
