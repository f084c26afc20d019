//! Full-pipeline submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics;
use crate::session::{remember_doc_id, SessionStore};
use crate::transport::{ApiError, JobSubmission, PipelineApi, Reply, SourceRef};

use super::types::{DocumentJob, JobHandle};

/// Errors raised by submission.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// A submission is already in flight.
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    /// Neither a file id nor a name was given.
    #[error("Enter a document path or ID.")]
    EmptySource,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Submits documents for a full pipeline run and tracks the resulting job.
pub struct JobSubmitter {
    api: Arc<dyn PipelineApi>,
    job: JobHandle,
    store: Option<Arc<dyn SessionStore>>,
    loading: AtomicBool,
}

/// Clears the in-flight flag however the submission ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn PipelineApi>, job: JobHandle) -> Self {
        Self {
            api,
            job,
            store: None,
            loading: AtomicBool::new(false),
        }
    }

    /// Persist each new doc id to `store`.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The job this submitter updates.
    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    /// Whether a submission is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Run the full pipeline for `source`.
    pub async fn submit(&self, source: &SourceRef) -> Result<Reply<JobSubmission>, SubmitError> {
        if source.is_empty() {
            return Err(SubmitError::EmptySource);
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            metrics::SUBMISSIONS.with_label_values(&["rejected"]).inc();
            return Err(SubmitError::AlreadyRunning);
        }
        let _guard = LoadingGuard(&self.loading);

        self.job.update(DocumentJob::mark_running);
        info!(source = source.label(), "Submitting document for pipeline run");

        match self.api.submit(source).await {
            Err(e) => {
                warn!(error = %e, "Pipeline submission failed");
                self.job.update(|job| job.mark_error(e.to_string()));
                metrics::SUBMISSIONS.with_label_values(&["error"]).inc();
                Err(e.into())
            }
            Ok(Reply::Offline) => {
                self.job.update(DocumentJob::mark_offline);
                metrics::SUBMISSIONS.with_label_values(&["offline"]).inc();
                Ok(Reply::Offline)
            }
            Ok(Reply::Live(submission)) => {
                let mut job = DocumentJob {
                    doc_id: submission.doc_id.clone().filter(|id| !id.is_empty()),
                    passes: submission
                        .passes
                        .as_ref()
                        .map(|p| p.get("passes").cloned().unwrap_or_else(|| p.clone())),
                    ..DocumentJob::default()
                };
                job.mark_completed();
                if let (Some(store), Some(doc_id)) = (&self.store, job.doc_id.as_deref()) {
                    remember_doc_id(store.as_ref(), doc_id);
                }
                info!(doc_id = ?job.doc_id, "Pipeline run accepted");
                self.job.replace(job);
                metrics::SUBMISSIONS.with_label_values(&["completed"]).inc();
                Ok(Reply::Live(submission))
            }
        }
    }
}
