//! Document job state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::stages::RunStatus;
use crate::transport::StatusPayload;

/// A document being processed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentJob {
    /// Assigned by the orchestrator; fixed once set.
    pub doc_id: Option<String>,
    pub status: RunStatus,
    /// Status string last reported by the orchestrator.
    pub remote_status: Option<String>,
    pub error: Option<String>,
    /// Pass summary last reported by the orchestrator.
    pub passes: Option<Value>,
    pub last_updated: DateTime<Utc>,
}

impl Default for DocumentJob {
    fn default() -> Self {
        Self {
            doc_id: None,
            status: RunStatus::Idle,
            remote_status: None,
            error: None,
            passes: None,
            last_updated: Utc::now(),
        }
    }
}

impl DocumentJob {
    /// A job for an already-known document.
    pub fn for_doc(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            ..Default::default()
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.error = None;
        self.touch();
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.touch();
    }

    pub fn mark_offline(&mut self) {
        self.status = RunStatus::Offline;
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Error;
        self.error = Some(message.into());
        self.touch();
    }

    /// Fold a status response into the job.
    ///
    /// A status echoing a different doc id starts a new job for that id.
    pub fn update_from_status(&mut self, payload: &StatusPayload) {
        if let Some(echoed) = payload.doc_id.as_deref().filter(|id| !id.is_empty()) {
            match self.doc_id.as_deref() {
                None => self.doc_id = Some(echoed.to_string()),
                Some(current) if current != echoed => {
                    warn!(from = current, to = echoed, "Orchestrator rekeyed document; starting new job");
                    *self = DocumentJob {
                        status: self.status,
                        ..DocumentJob::for_doc(echoed)
                    };
                }
                Some(_) => {}
            }
        }
        if let Some(status) = &payload.status {
            self.remote_status = Some(status.clone());
        }
        if let Some(passes) = &payload.passes {
            self.passes = Some(passes.clone());
        }
        self.touch();
    }
}

/// Shared, single-owner handle to a document job.
#[derive(Debug, Clone, Default)]
pub struct JobHandle(Arc<Mutex<DocumentJob>>);

impl JobHandle {
    pub fn new(job: DocumentJob) -> Self {
        Self(Arc::new(Mutex::new(job)))
    }

    fn lock(&self) -> MutexGuard<'_, DocumentJob> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current job.
    pub fn get(&self) -> DocumentJob {
        self.lock().clone()
    }

    /// Mutate the job in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut DocumentJob) -> R) -> R {
        f(&mut self.lock())
    }

    /// Replace the job wholesale.
    pub fn replace(&self, job: DocumentJob) {
        *self.lock() = job;
    }
}
