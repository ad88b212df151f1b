//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags, PathFlags};
use crate::commands;
use crate::infra::cpi::CpiJob;

/// Deploy a single-VM environment through a CPI plugin
#[derive(Parser)]
#[command(
    name = "microdeploy",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Log CPI and agent traffic to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// State file (default: ~/.microdeploy/state.json)
    #[arg(long, global = true, env = "MICRODEPLOY_STATE")]
    pub state: Option<PathBuf>,

    #[command(flatten)]
    pub cpi: CpiArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Location of the installed CPI job.
#[derive(Args, Default)]
pub struct CpiArgs {
    /// CPI job directory containing `bin/cpi`
    #[arg(long, global = true, env = "MICRODEPLOY_CPI_JOB_DIR")]
    pub cpi_job_dir: Option<PathBuf>,

    /// Directory of all installed jobs (default: parent of the CPI job directory)
    #[arg(long, global = true)]
    pub cpi_jobs_dir: Option<PathBuf>,

    /// Directory of all installed packages (default: `packages` next to the jobs directory)
    #[arg(long, global = true)]
    pub cpi_packages_dir: Option<PathBuf>,
}

impl CpiArgs {
    /// Resolve the CPI job layout, filling defaults from the job directory.
    #[must_use]
    pub fn job(&self) -> Option<CpiJob> {
        let job_dir = self.cpi_job_dir.clone()?;
        let jobs_dir = self.cpi_jobs_dir.clone().unwrap_or_else(|| {
            job_dir
                .parent()
                .map_or_else(|| job_dir.clone(), std::path::Path::to_path_buf)
        });
        let packages_dir = self.cpi_packages_dir.clone().unwrap_or_else(|| {
            jobs_dir
                .parent()
                .map_or_else(|| jobs_dir.join("packages"), |p| p.join("packages"))
        });
        Some(CpiJob {
            job_dir,
            jobs_dir,
            packages_dir,
        })
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update the deployment
    Deploy(commands::deploy::DeployArgs),

    /// Delete the deployment's VM, disks and stemcells
    Delete(commands::delete::DeleteArgs),

    /// Show the CPI's stemcell formats and API version
    CpiInfo,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            debug: _,
            state,
            cpi,
            command,
        } = self;
        let yes = matches!(&command, Command::Delete(args) if args.yes);
        let app = AppContext::new(AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
            paths: PathFlags {
                state,
                cpi: cpi.job(),
            },
        })?;

        match command {
            Command::Deploy(args) => commands::deploy::run(&args, &app).await,
            Command::Delete(args) => commands::delete::run(&args, &app).await,
            Command::CpiInfo => commands::cpi_info::run(&app).await,
        }
    }
}
