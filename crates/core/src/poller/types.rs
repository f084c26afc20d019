//! Poller types.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::projection::PassResult;
use crate::transport::{ApiError, Manifest, StatusPayload};

/// Progress once any status has been received.
pub const PROGRESS_STATUS: u8 = 40;
/// Progress once stage artifacts exist.
pub const PROGRESS_ARTIFACTS: u8 = 80;
/// Progress once a terminal audit status exists.
pub const PROGRESS_AUDITED: u8 = 95;
/// Progress once pass results exist.
pub const PROGRESS_DONE: u8 = 100;

/// Coarse progress estimate, recomputed from scratch each tick.
pub fn progress_percent(
    status: Option<&StatusPayload>,
    manifest: &Manifest,
    passes: &[PassResult],
) -> u8 {
    let Some(status) = status else {
        return 0;
    };
    if !passes.is_empty() {
        PROGRESS_DONE
    } else if status.audit_status().is_some() {
        PROGRESS_AUDITED
    } else if status.has_manifest() || !manifest.is_empty() {
        PROGRESS_ARTIFACTS
    } else {
        PROGRESS_STATUS
    }
}

/// State reported to the observer after every tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSnapshot {
    pub doc_id: String,
    /// Ticks completed so far in this session.
    pub tick: u32,
    pub status: Option<StatusPayload>,
    pub passes: Vec<PassResult>,
    /// Latest non-empty manifest seen.
    pub manifest: Manifest,
    pub progress: u8,
    pub offline: bool,
}

impl PollSnapshot {
    pub(crate) fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn refresh_progress(&mut self) {
        self.progress = progress_percent(self.status.as_ref(), &self.manifest, &self.passes);
    }

    /// Audit status carried by the last status payload.
    pub fn audit_status(&self) -> Option<&str> {
        self.status.as_ref().and_then(StatusPayload::audit_status)
    }
}

/// Why a poll session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    PassesReady,
    TerminalAudit,
    Offline,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PassesReady => "passes_ready",
            StopReason::TerminalAudit => "terminal_audit",
            StopReason::Offline => "offline",
            StopReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of a poll session.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub snapshot: PollSnapshot,
    pub reason: StopReason,
}

/// Errors that end a poll session.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The session task panicked or was aborted.
    #[error("poll session task failed: {0}")]
    Task(String),
}

/// Callback invoked with the snapshot after every tick.
pub type PollObserver = Arc<dyn Fn(&PollSnapshot) + Send + Sync>;
