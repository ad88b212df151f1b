//! Application context: unified state passed to every command handler.
//!
//! `AppContext` owns the output context, loaded configuration and the state
//! file manager, and builds the CPI and agent clients commands need.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::application::services::records;
use crate::domain::DeployerConfig;
use crate::infra::agent_client::{HttpAgentClient, TaskPolling};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::cpi::{CpiCloud, CpiCmdRunner, CpiJob};
use crate::infra::state::StateManager;
use crate::output::{OutputContext, TerminalReporter};

/// `reply_to` sent with every agent request.
const AGENT_REPLY_TO: &str = "microdeploy";

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `MICRODEPLOY_YES` env vars).
    pub yes: bool,
}

/// Where the state file and the CPI live.
pub struct PathFlags {
    /// State file override; defaults to `~/.microdeploy/state.json`.
    pub state: Option<PathBuf>,
    /// Installed CPI job, required by commands that talk to the cloud.
    pub cpi: Option<CpiJob>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    pub output: OutputFlags,
    pub behaviour: BehaviourFlags,
    pub paths: PathFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Deployment state file manager.
    pub state_mgr: StateManager,
    /// Deployer configuration from `~/.microdeploy/config.yaml`.
    pub config: DeployerConfig,
    /// Installed CPI job, if one was given.
    pub cpi: Option<CpiJob>,
    /// When `true`, skip interactive prompts and use defaults.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// configuration file is invalid.
    pub fn new(flags: AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("MICRODEPLOY_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        let state_mgr = match flags.paths.state {
            Some(path) => StateManager::with_path(path),
            None => StateManager::new()?,
        };
        let config = YamlConfigStore.load().context("loading configuration")?;

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            mode,
            state_mgr,
            config,
            cpi: flags.paths.cpi,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Progress reporter for application services.
    #[must_use]
    pub fn terminal_reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// The director identity sent with every CPI call.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be read or written.
    pub async fn director_id(&self) -> Result<String> {
        records::director_id(&self.state_mgr).await
    }

    /// CPI client for the configured CPI job.
    ///
    /// # Errors
    ///
    /// Returns an error if no CPI job directory was given.
    pub fn cloud(&self, director_id: &str) -> Result<CpiCloud<TokioCommandRunner>> {
        let job = self
            .cpi
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--cpi-job-dir is required for this command"))?;
        let runner = CpiCmdRunner::new(
            TokioCommandRunner::new(),
            job,
            self.config.cpi.command_timeout(),
        );
        Ok(CpiCloud::new(runner, director_id))
    }

    /// Agent client for the endpoint named in the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL is invalid.
    pub fn agent(&self, mbus_url: &str) -> Result<HttpAgentClient> {
        let polling = TaskPolling {
            attempts: self.config.retry.task_poll_attempts,
            delay: self.config.retry.task_poll_delay(),
        };
        HttpAgentClient::new(mbus_url, AGENT_REPLY_TO, polling)
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `MICRODEPLOY_YES` env),
    /// returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
