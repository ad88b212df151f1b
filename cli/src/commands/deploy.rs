//! `microdeploy deploy`: create or update the deployment.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::deploy::{
    self as service, DeployInput, DeployOptions, DeployOutcome,
};
use crate::infra::fs;

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Deployment manifest
    pub manifest: PathBuf,

    /// Extracted stemcell directory (contains `stemcell.MF` and `image`)
    #[arg(long)]
    pub stemcell: PathBuf,

    /// Compiled release artifacts (YAML or JSON)
    #[arg(long)]
    pub artifacts: Option<PathBuf>,
}

/// Run `microdeploy deploy`.
///
/// # Errors
///
/// Returns an error if an input cannot be read or any deploy step fails.
pub async fn run(args: &DeployArgs, app: &AppContext) -> Result<()> {
    let manifest = fs::read_manifest(&args.manifest)?;
    let stemcell = fs::read_stemcell(&args.stemcell)?;
    let artifacts = fs::read_artifacts(args.artifacts.as_deref())?;

    let director_id = app.director_id().await?;
    let cloud = app.cloud(&director_id)?;
    let agent = app.agent(manifest.manifest.mbus_url()?)?;

    let outcome = {
        let reporter = app.terminal_reporter();
        service::deploy(
            &cloud,
            &agent,
            &app.state_mgr,
            DeployInput {
                manifest_text: &manifest.text,
                manifest: &manifest.manifest,
                stemcell: &stemcell,
                artifacts: &artifacts,
            },
            DeployOptions {
                reporter: &reporter,
                config: &app.config,
            },
        )
        .await?
    };

    if app.is_json() {
        let value = match &outcome {
            DeployOutcome::NoChanges => serde_json::json!({ "changed": false }),
            DeployOutcome::Deployed { vm_cid, disk_cid } => serde_json::json!({
                "changed": true,
                "vm_cid": vm_cid,
                "disk_cid": disk_cid,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let ctx = &app.output;
    match outcome {
        DeployOutcome::NoChanges => ctx.success("No changes to deploy."),
        DeployOutcome::Deployed { vm_cid, disk_cid } => {
            ctx.header(&format!("Deployment '{}'", manifest.manifest.name));
            ctx.kv("VM", &vm_cid);
            ctx.kv("Disk", disk_cid.as_deref().unwrap_or("none"));
            ctx.kv("Stemcell", &stemcell.identity());
        }
    }
    Ok(())
}
