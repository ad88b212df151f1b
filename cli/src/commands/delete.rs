//! `microdeploy delete`: remove the deployment's VM, disks and stemcells.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::deploy::{self as service, DeployOptions};
use crate::infra::fs;

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Deployment manifest (names the agent endpoint)
    pub manifest: PathBuf,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Run `microdeploy delete`.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or a deletion fails.
pub async fn run(args: &DeleteArgs, app: &AppContext) -> Result<()> {
    let manifest = fs::read_manifest(&args.manifest)?;
    let ctx = &app.output;

    if !ctx.quiet {
        println!();
        println!(
            "This will permanently delete deployment '{}':",
            manifest.manifest.name
        );
        println!("  • its VM");
        println!("  • its persistent disks and the data on them");
        println!("  • uploaded stemcells");
        println!();
    }
    if !app.non_interactive && !app.confirm("Continue?", false)? {
        ctx.warn("Cancelled.");
        return Ok(());
    }

    let director_id = app.director_id().await?;
    let cloud = app.cloud(&director_id)?;
    let agent = app.agent(manifest.manifest.mbus_url()?)?;
    {
        let reporter = app.terminal_reporter();
        service::delete(
            &cloud,
            &agent,
            &app.state_mgr,
            DeployOptions {
                reporter: &reporter,
                config: &app.config,
            },
        )
        .await?;
    }

    if app.is_json() {
        println!("{}", serde_json::json!({ "deleted": true }));
    } else {
        ctx.success(&format!("Deployment '{}' deleted.", manifest.manifest.name));
    }
    Ok(())
}
