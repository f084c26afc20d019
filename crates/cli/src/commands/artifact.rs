//! `artifact-url` command implementation.

use anyhow::{bail, Result};

use super::AppContext;
use crate::cli::ArtifactArgs;

/// Execute the `artifact-url` command
pub fn run_artifact_url(ctx: &AppContext, args: &ArtifactArgs) -> Result<()> {
    if ctx.api.is_offline() {
        bail!("Artifacts cannot be downloaded in offline mode");
    }
    match ctx.api.artifact_url(&args.path) {
        Some(url) => {
            println!("{}", url);
            Ok(())
        }
        None => bail!("No artifact path given"),
    }
}
