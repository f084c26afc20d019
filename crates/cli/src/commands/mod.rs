//! Command implementations.

mod artifact;
mod poll;
mod run;
mod stages;

pub use artifact::run_artifact_url;
pub use poll::run_poll;
pub use run::run_pipeline;
pub use stages::run_stages;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fluidrag_core::{
    Config, HttpPipelineApi, JobHandle, PipelineApi, PollObserver, PollOutcome, PollSnapshot,
    PollerConfig, ProgressPoller, SessionStore, SourceRef, SqliteSessionStore,
};

use crate::cli::SourceArgs;
use crate::render;

/// Shared wiring for every command.
pub struct AppContext {
    pub config: Config,
    pub api: Arc<dyn PipelineApi>,
    /// Absent when the store could not be opened; persistence is best effort.
    pub store: Option<Arc<dyn SessionStore>>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let api: Arc<dyn PipelineApi> = Arc::new(
            HttpPipelineApi::new(&config.orchestrator)
                .context("Failed to create orchestrator client")?,
        );
        info!(client = api.name(), offline = api.is_offline(), "Orchestrator client ready");

        let store = match SqliteSessionStore::new(&config.session.path) {
            Ok(store) => Some(Arc::new(store) as Arc<dyn SessionStore>),
            Err(e) => {
                warn!(path = ?config.session.path, error = %e, "Session store unavailable");
                None
            }
        };

        Ok(Self { config, api, store })
    }

    /// Poller sharing `job` with the caller.
    pub fn poller(&self, config: &PollerConfig, job: JobHandle) -> ProgressPoller {
        ProgressPoller::new(Arc::clone(&self.api), config, job)
    }
}

impl SourceArgs {
    pub fn to_source_ref(&self) -> SourceRef {
        if self.file_id {
            SourceRef::with_id(&self.source)
        } else {
            SourceRef::named(&self.source)
        }
    }
}

/// Poll `doc_id` until it stops, printing each tick. Ctrl-C cancels.
pub async fn poll_to_completion(poller: &ProgressPoller, doc_id: &str) -> Result<PollOutcome> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping poll");
                cancel.cancel();
            }
        })
    };

    let observer: PollObserver = Arc::new(|snapshot: &PollSnapshot| {
        println!("{}", render::progress_line(snapshot));
    });
    let result = poller.run(doc_id, &cancel, &observer).await;
    interrupt.abort();

    result.with_context(|| format!("Polling failed for {}", doc_id))
}

/// Print the end of a poll session, as text or JSON.
pub fn print_outcome(api: &dyn PipelineApi, outcome: &PollOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "reason": outcome.reason,
            "snapshot": outcome.snapshot,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialize snapshot")?
        );
    } else {
        println!("{}", render::outcome_summary(outcome));
        let passes = render::pass_results(&outcome.snapshot.passes, api);
        if !passes.is_empty() {
            println!("{}", passes);
        }
    }
    Ok(())
}
