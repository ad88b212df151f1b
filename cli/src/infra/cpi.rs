//! CPI protocol client.
//!
//! [`CpiCmdRunner`] runs the plugin executable once per call, writing one
//! [`CpiCommand`] to its stdin and reading one [`CpiResult`] from its stdout.
//! [`CpiCloud`] implements the `Cloud` port on top of it: argument order per
//! method, error classification, and result shapes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use microdeploy_common::{CpiCommand, CpiContext, CpiResult};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::application::ports::{Cloud, CommandRunner, CommandSpec, CreateVmRequest};
use crate::domain::config::{ISOLATED_ENV_VAR, use_isolated_env};
use crate::domain::cpi::{CpiErrorKind, CpiInfo, INFO_REQUEST_API_VERSION};
use crate::domain::error::CloudError;

/// `PATH` handed to the plugin.
pub const CPI_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/sbin";

/// Where an installed CPI job lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpiJob {
    /// The CPI job's own directory; the executable is `bin/cpi` inside it.
    pub job_dir: PathBuf,
    /// Parent directory of all installed jobs.
    pub jobs_dir: PathBuf,
    /// Parent directory of all installed packages.
    pub packages_dir: PathBuf,
}

impl CpiJob {
    #[must_use]
    pub fn executable(&self) -> PathBuf {
        self.job_dir.join("bin").join("cpi")
    }
}

/// Runs one CPI method as one subprocess.
pub struct CpiCmdRunner<R> {
    runner: R,
    job: CpiJob,
    timeout: Duration,
}

impl<R: CommandRunner> CpiCmdRunner<R> {
    #[must_use]
    pub fn new(runner: R, job: CpiJob, timeout: Duration) -> Self {
        Self {
            runner,
            job,
            timeout,
        }
    }

    /// Execute `method` and return the plugin's parsed response.
    ///
    /// A response carrying an `error` is still `Ok` here; classifying it is
    /// the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::Transport`] if the environment toggle is invalid,
    /// the process cannot run, exits non-zero, or prints something that is
    /// not a CPI response.
    pub async fn run(
        &self,
        context: CpiContext,
        method: &str,
        api_version: u32,
        arguments: Vec<Value>,
    ) -> Result<CpiResult, CloudError> {
        let transport = |message: String| CloudError::Transport {
            method: method.to_string(),
            message,
        };

        let command = CpiCommand {
            method: method.to_string(),
            arguments,
            context,
            api_version,
        };
        let input = serde_json::to_vec(&command)
            .map_err(|e| transport(format!("Marshalling external CPI command input: {e}")))?;

        let clear_env = use_isolated_env(std::env::var(ISOLATED_ENV_VAR).ok().as_deref())
            .map_err(|e| transport(e.to_string()))?;

        let executable = self.job.executable();
        let spec = CommandSpec {
            program: &executable,
            args: &[],
            env: self.environment(),
            clear_env,
            stdin: &input,
            timeout: self.timeout,
        };

        debug!(
            method,
            stdin = %String::from_utf8_lossy(&input),
            "Executing external CPI command"
        );
        let output = self.runner.run_command(&spec).await.map_err(|e| {
            transport(format!("Running '{}': {e:#}", executable.display()))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            method,
            exit = ?output.status.code(),
            %stdout,
            %stderr,
            "External CPI command finished"
        );

        if !output.status.success() {
            return Err(transport(format!(
                "'{}' exited with {}: STDOUT: '{stdout}', STDERR: '{stderr}'",
                executable.display(),
                output.status
            )));
        }

        let result: CpiResult = serde_json::from_slice(&output.stdout).map_err(|e| {
            transport(format!(
                "Unmarshalling external CPI command output: STDOUT: '{stdout}', STDERR: '{stderr}': {e}"
            ))
        })?;

        if !result.log.is_empty() {
            debug!(method, log = %result.log, "CPI log");
        }
        Ok(result)
    }

    fn environment(&self) -> Vec<(String, String)> {
        vec![
            (
                "BOSH_PACKAGES_DIR".to_string(),
                self.job.packages_dir.display().to_string(),
            ),
            (
                "BOSH_JOBS_DIR".to_string(),
                self.job.jobs_dir.display().to_string(),
            ),
            ("PATH".to_string(), CPI_PATH.to_string()),
        ]
    }
}

/// The `Cloud` port backed by a CPI plugin.
pub struct CpiCloud<R> {
    runner: CpiCmdRunner<R>,
    director_id: String,
    /// Protocol version for every call after `info`.
    api_version: AtomicU32,
}

impl<R: CommandRunner> CpiCloud<R> {
    #[must_use]
    pub fn new(runner: CpiCmdRunner<R>, director_id: impl Into<String>) -> Self {
        Self {
            runner,
            director_id: director_id.into(),
            api_version: AtomicU32::new(INFO_REQUEST_API_VERSION),
        }
    }

    /// Protocol version currently sent with each call.
    #[must_use]
    pub fn api_version(&self) -> u32 {
        self.api_version.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        method: &str,
        arguments: Vec<Value>,
        stemcell_api_version: Option<u32>,
    ) -> Result<Value, CloudError> {
        let mut context = CpiContext::new(self.director_id.clone());
        if let Some(version) = stemcell_api_version {
            context = context.with_stemcell_api_version(version);
        }
        let result = self
            .runner
            .run(context, method, self.api_version(), arguments)
            .await?;

        if let Some(payload) = result.error {
            return Err(CloudError::Cpi {
                method: method.to_string(),
                kind: CpiErrorKind::classify(&payload.error_type),
                payload,
            });
        }
        Ok(result.result)
    }
}

fn expect_cid(method: &str, value: &Value) -> Result<String, CloudError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CloudError::ResponseUnmarshalling {
            method: method.to_string(),
            reason: format!("expected a CID string, got '{value}'"),
        })
}

impl<R: CommandRunner> Cloud for CpiCloud<R> {
    async fn info(&self) -> Result<CpiInfo, CloudError> {
        let context = CpiContext::new(self.director_id.clone());
        let result = self
            .runner
            .run(context, "info", INFO_REQUEST_API_VERSION, vec![json!("")])
            .await?;
        if let Some(payload) = result.error {
            return Err(CloudError::Cpi {
                method: "info".to_string(),
                kind: CpiErrorKind::classify(&payload.error_type),
                payload,
            });
        }
        let info = CpiInfo::from_result(&result.result)?;
        self.api_version.store(info.api_version, Ordering::Relaxed);
        info!(api_version = info.api_version, "Negotiated CPI API version");
        Ok(info)
    }

    async fn create_stemcell(
        &self,
        image_path: &Path,
        cloud_properties: &Map<String, Value>,
    ) -> Result<String, CloudError> {
        let method = "create_stemcell";
        let value = self
            .call(
                method,
                vec![json!(image_path.display().to_string()), json!(cloud_properties)],
                None,
            )
            .await?;
        expect_cid(method, &value)
    }

    async fn delete_stemcell(&self, stemcell_cid: &str) -> Result<(), CloudError> {
        self.call("delete_stemcell", vec![json!(stemcell_cid)], None)
            .await
            .map(drop)
    }

    async fn create_vm(&self, request: &CreateVmRequest<'_>) -> Result<String, CloudError> {
        let method = "create_vm";
        let value = self
            .call(
                method,
                vec![
                    json!(request.agent_id),
                    json!(request.stemcell_cid),
                    json!(request.cloud_properties),
                    json!(request.networks),
                    json!([]),
                    json!(request.env),
                ],
                Some(request.stemcell_api_version),
            )
            .await?;
        // API v2 answers `[cid, networks]`.
        match &value {
            Value::Array(items) => match items.first() {
                Some(first) => expect_cid(method, first),
                None => expect_cid(method, &value),
            },
            other => expect_cid(method, other),
        }
    }

    async fn set_vm_metadata(
        &self,
        vm_cid: &str,
        metadata: &BTreeMap<String, String>,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        self.call(
            "set_vm_metadata",
            vec![json!(vm_cid), json!(metadata)],
            Some(stemcell_api_version),
        )
        .await
        .map(drop)
    }

    async fn has_vm(&self, vm_cid: &str, stemcell_api_version: u32) -> Result<bool, CloudError> {
        let method = "has_vm";
        let value = self
            .call(method, vec![json!(vm_cid)], Some(stemcell_api_version))
            .await?;
        value
            .as_bool()
            .ok_or_else(|| CloudError::ResponseUnmarshalling {
                method: method.to_string(),
                reason: format!("expected a boolean, got '{value}'"),
            })
    }

    async fn delete_vm(&self, vm_cid: &str, stemcell_api_version: u32) -> Result<(), CloudError> {
        self.call("delete_vm", vec![json!(vm_cid)], Some(stemcell_api_version))
            .await
            .map(drop)
    }

    async fn create_disk(
        &self,
        size: u64,
        cloud_properties: &Map<String, Value>,
        vm_cid: &str,
    ) -> Result<String, CloudError> {
        let method = "create_disk";
        let value = self
            .call(
                method,
                vec![json!(size), json!(cloud_properties), json!(vm_cid)],
                None,
            )
            .await?;
        expect_cid(method, &value)
    }

    async fn attach_disk(
        &self,
        vm_cid: &str,
        disk_cid: &str,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        let hint = self
            .call(
                "attach_disk",
                vec![json!(vm_cid), json!(disk_cid)],
                Some(stemcell_api_version),
            )
            .await?;
        if !hint.is_null() {
            debug!(vm_cid, disk_cid, %hint, "CPI returned a disk hint");
        }
        Ok(())
    }

    async fn detach_disk(
        &self,
        vm_cid: &str,
        disk_cid: &str,
        stemcell_api_version: u32,
    ) -> Result<(), CloudError> {
        self.call(
            "detach_disk",
            vec![json!(vm_cid), json!(disk_cid)],
            Some(stemcell_api_version),
        )
        .await
        .map(drop)
    }

    async fn delete_disk(&self, disk_cid: &str) -> Result<(), CloudError> {
        self.call("delete_disk", vec![json!(disk_cid)], None)
            .await
            .map(drop)
    }
}
