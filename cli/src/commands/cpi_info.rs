//! `microdeploy cpi-info`: show what the CPI supports.

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::ports::Cloud;

/// Run `microdeploy cpi-info`.
///
/// # Errors
///
/// Returns an error if the CPI cannot be run or its answer is malformed.
pub async fn run(app: &AppContext) -> Result<()> {
    let director_id = app.director_id().await?;
    let cloud = app.cloud(&director_id)?;
    let info = cloud.info().await.context("Getting CPI info")?;

    if app.is_json() {
        let value = serde_json::json!({
            "api_version": info.api_version,
            "stemcell_formats": info.stemcell_formats,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let ctx = &app.output;
    ctx.header("CPI");
    ctx.kv("API version", &info.api_version.to_string());
    let formats = info
        .stemcell_formats
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    ctx.kv(
        "Stemcell formats",
        if formats.is_empty() { "none" } else { &formats },
    );
    Ok(())
}
