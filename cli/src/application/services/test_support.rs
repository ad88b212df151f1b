//! Shared test doubles for application service tests.
//!
//! The fakes keep just enough state to behave like the real thing: the cloud
//! forgets deleted VMs and disks and answers `NotFound` for them, the agent
//! tracks what it has mounted.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;

use anyhow::Result;
use microdeploy_common::CpiErrorPayload;
use serde_json::{Map, Value};

use crate::application::ports::{
    AgentClient, Cloud, CreateVmRequest, DeploymentStateStore, ProgressReporter,
};
use crate::domain::{AgentError, ApplySpec, CloudError, CpiErrorKind, CpiInfo, DeploymentState};

/// Build an `ExitStatus` from a logical exit code.
#[cfg(unix)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    std::process::ExitStatus::from_raw(code as u32)
}

pub fn cpi_error(method: &str, kind: CpiErrorKind) -> CloudError {
    let error_type = match kind {
        CpiErrorKind::VmNotFound => "Bosh::Clouds::VMNotFound",
        CpiErrorKind::DiskNotFound => "Bosh::Clouds::DiskNotFound",
        CpiErrorKind::StemcellNotFound => "Bosh::Clouds::StemcellNotFound",
        CpiErrorKind::NotImplemented => "Bosh::Clouds::NotImplemented",
        CpiErrorKind::Cloud => "Bosh::Clouds::CloudError",
    };
    CloudError::Cpi {
        method: method.to_string(),
        kind,
        payload: CpiErrorPayload {
            error_type: error_type.to_string(),
            message: format!("fake {method} failure"),
            ok_to_retry: false,
        },
    }
}

// ── Cloud ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCloud {
    pub calls: RefCell<Vec<String>>,
    pub vms: RefCell<BTreeSet<String>>,
    pub disks: RefCell<BTreeSet<String>>,
    pub stemcells: RefCell<BTreeSet<String>>,
    /// disk CID → VM CID
    pub attached: RefCell<BTreeMap<String, String>>,
    pub metadata: RefCell<BTreeMap<String, String>>,
    /// Injected failures keyed by `method` or `method:target`.
    pub failures: RefCell<HashMap<String, CpiErrorKind>>,
    pub api_version: Cell<u32>,
    next_id: Cell<u32>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, key: &str, kind: CpiErrorKind) {
        self.failures.borrow_mut().insert(key.to_string(), kind);
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split(':').next() == Some(method))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }

    fn record(&self, method: &str, target: &str) -> Result<(), CloudError> {
        self.calls.borrow_mut().push(format!("{method}:{target}"));
        let failures = self.failures.borrow();
        let kind = failures
            .get(&format!("{method}:{target}"))
            .or_else(|| failures.get(method));
        match kind {
            Some(kind) => Err(cpi_error(method, *kind)),
            None => Ok(()),
        }
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("{prefix}-{n}")
    }
}

impl Cloud for FakeCloud {
    async fn info(&self) -> Result<CpiInfo, CloudError> {
        self.record("info", "")?;
        Ok(CpiInfo {
            stemcell_formats: BTreeSet::from(["warden-tgz".to_string()]),
            api_version: self.api_version.get(),
        })
    }

    async fn create_stemcell(
        &self,
        _image_path: &Path,
        _cloud_properties: &Map<String, Value>,
    ) -> Result<String, CloudError> {
        self.record("create_stemcell", "")?;
        let cid = self.next("sc-cid");
        self.stemcells.borrow_mut().insert(cid.clone());
        Ok(cid)
    }

    async fn delete_stemcell(&self, stemcell_cid: &str) -> Result<(), CloudError> {
        self.record("delete_stemcell", stemcell_cid)?;
        if !self.stemcells.borrow_mut().remove(stemcell_cid) {
            return Err(cpi_error("delete_stemcell", CpiErrorKind::StemcellNotFound));
        }
        Ok(())
    }

    async fn create_vm(&self, request: &CreateVmRequest<'_>) -> Result<String, CloudError> {
        self.record("create_vm", request.stemcell_cid)?;
        let cid = self.next("vm-cid");
        self.vms.borrow_mut().insert(cid.clone());
        Ok(cid)
    }

    async fn set_vm_metadata(
        &self,
        vm_cid: &str,
        metadata: &BTreeMap<String, String>,
        _stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        self.record("set_vm_metadata", vm_cid)?;
        self.metadata.replace(metadata.clone());
        Ok(())
    }

    async fn has_vm(&self, vm_cid: &str, _stemcell_api_version: u32) -> Result<bool, CloudError> {
        self.record("has_vm", vm_cid)?;
        Ok(self.vms.borrow().contains(vm_cid))
    }

    async fn delete_vm(&self, vm_cid: &str, _stemcell_api_version: u32) -> Result<(), CloudError> {
        self.record("delete_vm", vm_cid)?;
        if !self.vms.borrow_mut().remove(vm_cid) {
            return Err(cpi_error("delete_vm", CpiErrorKind::VmNotFound));
        }
        self.attached.borrow_mut().retain(|_, vm| vm != vm_cid);
        Ok(())
    }

    async fn create_disk(
        &self,
        _size: u64,
        _cloud_properties: &Map<String, Value>,
        vm_cid: &str,
    ) -> Result<String, CloudError> {
        self.record("create_disk", vm_cid)?;
        let cid = self.next("disk-cid");
        self.disks.borrow_mut().insert(cid.clone());
        Ok(cid)
    }

    async fn attach_disk(
        &self,
        vm_cid: &str,
        disk_cid: &str,
        _stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        self.record("attach_disk", disk_cid)?;
        if !self.disks.borrow().contains(disk_cid) {
            return Err(cpi_error("attach_disk", CpiErrorKind::DiskNotFound));
        }
        self.attached
            .borrow_mut()
            .insert(disk_cid.to_string(), vm_cid.to_string());
        Ok(())
    }

    async fn detach_disk(
        &self,
        _vm_cid: &str,
        disk_cid: &str,
        _stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        self.record("detach_disk", disk_cid)?;
        if !self.disks.borrow().contains(disk_cid) {
            return Err(cpi_error("detach_disk", CpiErrorKind::DiskNotFound));
        }
        self.attached.borrow_mut().remove(disk_cid);
        Ok(())
    }

    async fn delete_disk(&self, disk_cid: &str) -> Result<(), CloudError> {
        self.record("delete_disk", disk_cid)?;
        if !self.disks.borrow_mut().remove(disk_cid) {
            return Err(cpi_error("delete_disk", CpiErrorKind::DiskNotFound));
        }
        self.attached.borrow_mut().remove(disk_cid);
        Ok(())
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAgent {
    pub calls: RefCell<Vec<String>>,
    /// Pings that fail before the agent starts answering.
    pub ping_failures: Cell<u32>,
    pub unreachable: Cell<bool>,
    /// Job states returned by `get_state`, then `running` once drained.
    pub states: RefCell<VecDeque<String>>,
    pub mounted: RefCell<Vec<String>>,
    /// Methods that answer with an exception.
    pub failing: RefCell<BTreeSet<String>>,
    pub applied: RefCell<Option<ApplySpec>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_states(&self, states: &[&str]) {
        self.states
            .borrow_mut()
            .extend(states.iter().map(|s| (*s).to_string()));
    }

    pub fn fail(&self, method: &str) {
        self.failing.borrow_mut().insert(method.to_string());
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split(':').next() == Some(method))
            .count()
    }

    fn record(&self, method: &str, arg: &str) -> Result<(), AgentError> {
        self.calls.borrow_mut().push(format!("{method}:{arg}"));
        if self.failing.borrow().contains(method) {
            return Err(AgentError::Exception {
                method: method.to_string(),
                message: format!("fake {method} failure"),
            });
        }
        Ok(())
    }
}

impl AgentClient for FakeAgent {
    async fn ping(&self) -> Result<String, AgentError> {
        self.record("ping", "")?;
        let remaining = self.ping_failures.get();
        if self.unreachable.get() || remaining > 0 {
            self.ping_failures.set(remaining.saturating_sub(1));
            return Err(AgentError::Transport {
                method: "ping".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok("pong".to_string())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.record("stop", "")
    }

    async fn apply(&self, spec: &ApplySpec) -> Result<(), AgentError> {
        self.record("apply", "")?;
        self.applied.replace(Some(spec.clone()));
        Ok(())
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.record("start", "")
    }

    async fn get_state(&self) -> Result<String, AgentError> {
        self.record("get_state", "")?;
        Ok(self
            .states
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| "running".to_string()))
    }

    async fn list_disk(&self) -> Result<Vec<String>, AgentError> {
        self.record("list_disk", "")?;
        Ok(self.mounted.borrow().clone())
    }

    async fn mount_disk(&self, disk_cid: &str) -> Result<(), AgentError> {
        self.record("mount_disk", disk_cid)?;
        self.mounted.borrow_mut().push(disk_cid.to_string());
        Ok(())
    }

    async fn unmount_disk(&self, disk_cid: &str) -> Result<(), AgentError> {
        self.record("unmount_disk", disk_cid)?;
        self.mounted.borrow_mut().retain(|d| d != disk_cid);
        Ok(())
    }

    async fn migrate_disk(&self) -> Result<(), AgentError> {
        self.record("migrate_disk", "")
    }
}

// ── State store ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub state: RefCell<Option<DeploymentState>>,
    pub saves: Cell<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: DeploymentState) -> Self {
        Self {
            state: RefCell::new(Some(state)),
            saves: Cell::new(0),
        }
    }

    pub fn snapshot(&self) -> DeploymentState {
        self.state.borrow().clone().unwrap_or_default()
    }
}

impl DeploymentStateStore for MemoryStore {
    async fn load_async(&self) -> Result<Option<DeploymentState>> {
        Ok(self.state.borrow().clone())
    }

    async fn save_async(&self, state: &DeploymentState) -> Result<()> {
        self.saves.set(self.saves.get() + 1);
        self.state.replace(Some(state.clone()));
        Ok(())
    }
}

// ── Reporter ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub lines: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|l| l.strip_prefix("warn: ").map(str::to_string))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.borrow_mut().push(format!("step: {message}"));
    }

    fn success(&self, message: &str) {
        self.lines.borrow_mut().push(format!("ok: {message}"));
    }

    fn warn(&self, message: &str) {
        self.lines.borrow_mut().push(format!("warn: {message}"));
    }
}
