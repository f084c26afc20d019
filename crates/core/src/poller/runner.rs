//! Poll loop and session management.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{DocumentJob, JobHandle};
use crate::metrics;
use crate::projection::project_results;
use crate::transport::{ApiError, PipelineApi, Reply};

use super::config::PollerConfig;
use super::types::{PollError, PollObserver, PollOutcome, PollSnapshot, StopReason};

type SessionResult = Result<PollOutcome, PollError>;

/// The tick loop, cloneable into a spawned session.
#[derive(Clone)]
struct PollLoop {
    api: Arc<dyn PipelineApi>,
    interval: Duration,
    job: JobHandle,
}

/// An active poll session.
struct PollSession {
    doc_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    /// Set once by the task when the loop returns.
    outcome: watch::Receiver<Option<SessionResult>>,
}

impl PollSession {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(doc_id = %self.doc_id, error = %e, "Previous poll session task failed");
            return;
        }
        match &*self.outcome.borrow() {
            Some(Ok(outcome)) => {
                debug!(doc_id = %self.doc_id, reason = %outcome.reason, "Previous poll session stopped")
            }
            Some(Err(e)) => debug!(doc_id = %self.doc_id, error = %e, "Previous poll session ended with error"),
            None => {}
        };
    }
}

/// Polls pipeline status and results for one document at a time.
pub struct ProgressPoller {
    inner: PollLoop,
    session: Mutex<Option<PollSession>>,
}

impl ProgressPoller {
    pub fn new(api: Arc<dyn PipelineApi>, config: &PollerConfig, job: JobHandle) -> Self {
        Self {
            inner: PollLoop {
                api,
                interval: config.interval(),
                job,
            },
            session: Mutex::new(None),
        }
    }

    /// The job updated by every tick.
    pub fn job(&self) -> &JobHandle {
        &self.inner.job
    }

    /// Poll `doc_id` in the current task until a stop condition.
    ///
    /// This bypasses session management; the caller owns `cancel`.
    pub async fn run(
        &self,
        doc_id: &str,
        cancel: &CancellationToken,
        observer: &PollObserver,
    ) -> SessionResult {
        self.inner.run(doc_id, cancel, observer).await
    }

    /// Start a background session for `doc_id`.
    ///
    /// Any outstanding session is cancelled and awaited first, so its observer
    /// never fires after this returns.
    pub async fn start(&self, doc_id: impl Into<String>, observer: PollObserver) {
        let doc_id = doc_id.into();
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!(from = %previous.doc_id, to = %doc_id, "Superseding active poll session");
            previous.stop().await;
        }

        let cancel = CancellationToken::new();
        let (done, outcome) = watch::channel(None);
        let handle = {
            let inner = self.inner.clone();
            let cancel = cancel.clone();
            let doc_id = doc_id.clone();
            tokio::spawn(async move {
                let result = inner.run(&doc_id, &cancel, &observer).await;
                done.send_replace(Some(result));
            })
        };
        *session = Some(PollSession {
            doc_id,
            cancel,
            handle,
            outcome,
        });
    }

    /// Cancel the active session and wait for it to stop.
    ///
    /// Returns `false` when there was no session.
    pub async fn cancel(&self) -> bool {
        let previous = self.session.lock().await.take();
        match previous {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// Wait for the current session to finish and return its outcome.
    ///
    /// The session stays registered, so `start` and `cancel` still wait for
    /// its task while a join is pending. Returns `None` when there is no session.
    pub async fn join(&self) -> Option<SessionResult> {
        let mut outcome = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.outcome.clone())?;
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(result) => (*result).clone(),
            Err(_) => None,
        };
        Some(result.unwrap_or_else(|| {
            Err(PollError::Task("session ended without an outcome".to_string()))
        }))
    }

    /// Whether a session is still running.
    pub async fn is_active(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl PollLoop {
    async fn run(
        &self,
        doc_id: &str,
        cancel: &CancellationToken,
        observer: &PollObserver,
    ) -> SessionResult {
        let mut snapshot = PollSnapshot::new(doc_id);
        info!(doc_id, interval_ms = self.interval.as_millis() as u64, "Poll session started");

        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish(snapshot, StopReason::Cancelled));
            }
            metrics::POLL_TICKS.inc();
            snapshot.tick += 1;

            // Status always precedes results within a tick.
            let reply = self.api.status(&snapshot.doc_id).await;
            let status = match reply {
                Ok(reply) => reply,
                Err(e) => return self.fail(snapshot, e, cancel),
            };
            if cancel.is_cancelled() {
                return Ok(self.finish(snapshot, StopReason::Cancelled));
            }
            let status = match status {
                Reply::Offline => return Ok(self.stop_offline(snapshot, observer)),
                Reply::Live(status) => status,
            };
            if let Some(echoed) = status
                .doc_id
                .as_deref()
                .filter(|id| !id.is_empty() && *id != snapshot.doc_id)
            {
                info!(from = %snapshot.doc_id, to = echoed, "Adopting doc id echoed by orchestrator");
                snapshot.doc_id = echoed.to_string();
            }
            self.job.update(|job| job.update_from_status(&status));
            let reported = status.pass_manifest();
            if !reported.is_empty() {
                snapshot.manifest = reported;
            }
            snapshot.status = Some(status);

            let reply = self.api.results(&snapshot.doc_id).await;
            let results = match reply {
                Ok(reply) => reply,
                Err(e) => return self.fail(snapshot, e, cancel),
            };
            if cancel.is_cancelled() {
                return Ok(self.finish(snapshot, StopReason::Cancelled));
            }
            let results = match results {
                Reply::Offline => return Ok(self.stop_offline(snapshot, observer)),
                Reply::Live(results) => results,
            };
            if let Some(manifest) = results.manifest.as_ref().filter(|m| !m.is_empty()) {
                snapshot.manifest = manifest.clone();
            }
            snapshot.passes = project_results(&results, &snapshot.manifest);
            snapshot.refresh_progress();

            debug!(
                doc_id = %snapshot.doc_id,
                tick = snapshot.tick,
                progress = snapshot.progress,
                passes = snapshot.passes.len(),
                "Poll tick"
            );
            observer(&snapshot);

            let reason = if !snapshot.passes.is_empty() {
                Some(StopReason::PassesReady)
            } else if snapshot.audit_status().is_some() {
                Some(StopReason::TerminalAudit)
            } else if cancel.is_cancelled() {
                Some(StopReason::Cancelled)
            } else {
                None
            };
            if let Some(reason) = reason {
                return Ok(self.finish(snapshot, reason));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(self.finish(snapshot, StopReason::Cancelled));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn stop_offline(&self, mut snapshot: PollSnapshot, observer: &PollObserver) -> PollOutcome {
        snapshot.offline = true;
        snapshot.refresh_progress();
        observer(&snapshot);
        self.finish(snapshot, StopReason::Offline)
    }

    fn finish(&self, snapshot: PollSnapshot, reason: StopReason) -> PollOutcome {
        match reason {
            StopReason::PassesReady | StopReason::TerminalAudit => {
                self.job.update(DocumentJob::mark_completed)
            }
            StopReason::Offline => self.job.update(DocumentJob::mark_offline),
            StopReason::Cancelled => {}
        }
        metrics::POLL_SESSIONS
            .with_label_values(&[reason.as_str()])
            .inc();
        info!(
            doc_id = %snapshot.doc_id,
            reason = %reason,
            ticks = snapshot.tick,
            progress = snapshot.progress,
            "Poll session stopped"
        );
        PollOutcome { snapshot, reason }
    }

    /// Record a failed call on the job and end the session.
    ///
    /// A call that fails after cancellation is discarded instead.
    fn fail(&self, snapshot: PollSnapshot, error: ApiError, cancel: &CancellationToken) -> SessionResult {
        if cancel.is_cancelled() {
            return Ok(self.finish(snapshot, StopReason::Cancelled));
        }
        warn!(doc_id = %snapshot.doc_id, tick = snapshot.tick, error = %error, "Poll tick failed");
        self.job.update(|job| job.mark_error(error.to_string()));
        metrics::POLL_SESSIONS.with_label_values(&["error"]).inc();
        Err(error.into())
    }
}
