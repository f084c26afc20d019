//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::info;

use fluidrag_core::{JobHandle, JobSubmitter, Reply};

use super::{poll_to_completion, print_outcome, AppContext};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_pipeline(ctx: &AppContext, args: &RunArgs) -> Result<()> {
    let job = JobHandle::default();
    let mut submitter = JobSubmitter::new(ctx.api.clone(), job.clone());
    if let Some(store) = &ctx.store {
        submitter = submitter.with_session_store(store.clone());
    }

    let source = args.source.to_source_ref();
    let submission = match submitter
        .submit(&source)
        .await
        .context("Pipeline submission failed")?
    {
        Reply::Offline => {
            println!("Offline mode: pipeline run not submitted.");
            return Ok(());
        }
        Reply::Live(submission) => submission,
    };

    let Some(doc_id) = submission.doc_id.filter(|id| !id.is_empty()) else {
        println!("Pipeline run accepted without a document id; nothing to poll.");
        return Ok(());
    };
    println!("Submitted {} as {}", source.label(), doc_id);
    if let Some(manifest) = &submission.manifest_path {
        println!("Manifest: {}", manifest);
    }

    if args.no_poll {
        return Ok(());
    }

    info!(doc_id = %doc_id, "Polling pipeline progress");
    let poller = ctx.poller(&ctx.config.poller, job);
    let outcome = poll_to_completion(&poller, &doc_id).await?;
    print_outcome(ctx.api.as_ref(), &outcome, args.json)
}
