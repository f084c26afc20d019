//! `poll` command implementation.

use anyhow::{bail, Result};
use tracing::{info, warn};

use fluidrag_core::{DocumentJob, JobHandle, PollerConfig};

use super::{poll_to_completion, print_outcome, AppContext};
use crate::cli::PollArgs;

/// Execute the `poll` command
pub async fn run_poll(ctx: &AppContext, args: &PollArgs) -> Result<()> {
    let Some(doc_id) = resolve_doc_id(ctx, args) else {
        bail!("No document id given and none stored from a previous run");
    };

    let config = PollerConfig {
        interval_ms: args.interval_ms.unwrap_or(ctx.config.poller.interval_ms),
    };
    if config.interval_ms == 0 {
        bail!("Poll interval must be greater than zero");
    }

    info!(doc_id = %doc_id, interval_ms = config.interval_ms, "Resuming poll");
    let poller = ctx.poller(&config, JobHandle::new(DocumentJob::for_doc(&doc_id)));
    let outcome = poll_to_completion(&poller, &doc_id).await?;
    print_outcome(ctx.api.as_ref(), &outcome, args.json)
}

/// Explicit id first, then the last id persisted by `run`.
fn resolve_doc_id(ctx: &AppContext, args: &PollArgs) -> Option<String> {
    if let Some(id) = args.doc_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    let store = ctx.store.as_ref()?;
    match store.last_doc_id() {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Unable to read last doc id");
            None
        }
    }
}
