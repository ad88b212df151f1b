//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::domain::{AgentError, ApplySpec, CloudError, CpiInfo, DeploymentState};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// One external process invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub program: &'a Path,
    pub args: &'a [&'a str],
    /// Variables set on the child, applied after `clear_env`.
    pub env: Vec<(String, String)>,
    /// Start the child from an empty environment.
    pub clear_env: bool,
    pub stdin: &'a [u8],
    pub timeout: Duration,
}

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program to completion, feeding it `spec.stdin`, and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds its timeout.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_command(&self, spec: &CommandSpec<'_>) -> Result<Output>;
}

// ── Cloud Port ────────────────────────────────────────────────────────────────

/// Arguments of a `create_vm` call.
#[derive(Debug, Clone)]
pub struct CreateVmRequest<'a> {
    pub agent_id: &'a str,
    pub stemcell_cid: &'a str,
    pub stemcell_api_version: u32,
    pub cloud_properties: &'a Map<String, Value>,
    pub networks: &'a Map<String, Value>,
    pub env: &'a Map<String, Value>,
}

/// The infrastructure backend, reached through a CPI plugin.
///
/// VM-scoped calls take the stemcell API version of the VM they touch so the
/// plugin can pick the matching dialect.
#[allow(async_fn_in_trait)]
pub trait Cloud {
    /// Ask the plugin for its capabilities and fix the API version for later calls.
    async fn info(&self) -> Result<CpiInfo, CloudError>;

    async fn create_stemcell(
        &self,
        image_path: &Path,
        cloud_properties: &Map<String, Value>,
    ) -> Result<String, CloudError>;

    async fn delete_stemcell(&self, stemcell_cid: &str) -> Result<(), CloudError>;

    async fn create_vm(&self, request: &CreateVmRequest<'_>) -> Result<String, CloudError>;

    async fn set_vm_metadata(
        &self,
        vm_cid: &str,
        metadata: &BTreeMap<String, String>,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError>;

    async fn has_vm(&self, vm_cid: &str, stemcell_api_version: u32) -> Result<bool, CloudError>;

    async fn delete_vm(&self, vm_cid: &str, stemcell_api_version: u32) -> Result<(), CloudError>;

    async fn create_disk(
        &self,
        size: u64,
        cloud_properties: &Map<String, Value>,
        vm_cid: &str,
    ) -> Result<String, CloudError>;

    async fn attach_disk(
        &self,
        vm_cid: &str,
        disk_cid: &str,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError>;

    async fn detach_disk(
        &self,
        vm_cid: &str,
        disk_cid: &str,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError>;

    async fn delete_disk(&self, disk_cid: &str) -> Result<(), CloudError>;
}

// ── Agent Port ────────────────────────────────────────────────────────────────

/// The in-VM agent. Task-based methods return once the agent reports the
/// task finished.
#[allow(async_fn_in_trait)]
pub trait AgentClient {
    async fn ping(&self) -> Result<String, AgentError>;
    async fn stop(&self) -> Result<(), AgentError>;
    async fn apply(&self, spec: &ApplySpec) -> Result<(), AgentError>;
    async fn start(&self) -> Result<(), AgentError>;
    /// Current job state, e.g. `"running"` or `"pending"`.
    async fn get_state(&self) -> Result<String, AgentError>;
    /// CIDs of the disks the agent has mounted.
    async fn list_disk(&self) -> Result<Vec<String>, AgentError>;
    async fn mount_disk(&self, disk_cid: &str) -> Result<(), AgentError>;
    async fn unmount_disk(&self, disk_cid: &str) -> Result<(), AgentError>;
    /// Copy persistent data from the old mount to the newly mounted disk.
    async fn migrate_disk(&self) -> Result<(), AgentError>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait: no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── State and Config Ports ────────────────────────────────────────────────────

/// Abstracts deployment state persistence (load/save).
#[allow(async_fn_in_trait)]
pub trait DeploymentStateStore {
    /// Load the current deployment state, returning `None` if no state exists.
    async fn load_async(&self) -> Result<Option<DeploymentState>>;
    /// Persist the given deployment state.
    async fn save_async(&self, state: &DeploymentState) -> Result<()>;
}

/// Abstracts deployer configuration loading.
pub trait ConfigStore {
    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<crate::domain::DeployerConfig>;
    /// Path of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
