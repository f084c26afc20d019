//! Types for the stage state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{ApiError, ResponseBody};

/// Lifecycle status shared by stages and document jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Offline,
}

impl RunStatus {
    /// Returns the string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
            RunStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the document pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Preprocess,
    Headers,
    Passes,
}

impl Stage {
    /// Pipeline order.
    pub const ORDER: [Stage; 4] = [Stage::Upload, Stage::Preprocess, Stage::Headers, Stage::Passes];

    /// Position in pipeline order.
    pub fn index(self) -> usize {
        match self {
            Stage::Upload => 0,
            Stage::Preprocess => 1,
            Stage::Headers => 2,
            Stage::Passes => 3,
        }
    }

    /// Stages strictly after this one.
    pub fn downstream(self) -> &'static [Stage] {
        &Self::ORDER[self.index() + 1..]
    }

    /// The stage whose artifact this one consumes.
    pub fn upstream(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Preprocess => "preprocess",
            Stage::Headers => "headers",
            Stage::Passes => "passes",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-step payloads of the preprocess stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessPayload {
    pub parse: Option<ResponseBody>,
    pub chunk: Option<ResponseBody>,
}

/// Last payload recorded on a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    Response(ResponseBody),
    Preprocess(PreprocessPayload),
}

impl StagePayload {
    /// String field from the payload, looking into preprocess sub-steps in order.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        match self {
            StagePayload::Response(body) => body.str_field(key),
            StagePayload::Preprocess(p) => p
                .chunk
                .as_ref()
                .and_then(|b| b.str_field(key))
                .or_else(|| p.parse.as_ref().and_then(|b| b.str_field(key))),
        }
    }
}

/// State of a single stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageRecord {
    pub status: RunStatus,
    pub payload: Option<StagePayload>,
    pub error: Option<String>,
    /// Output artifact consumed by the next stage.
    pub artifact: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Bumped whenever the record is invalidated; in-flight runs from an
    /// older epoch are discarded.
    pub(crate) epoch: u64,
}

impl StageRecord {
    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.error = None;
        self.touch();
    }

    pub(crate) fn mark_completed(&mut self, payload: StagePayload, artifact: Option<String>) {
        self.status = RunStatus::Completed;
        self.payload = Some(payload);
        self.artifact = artifact;
        self.touch();
    }

    pub(crate) fn mark_offline(&mut self, payload: Option<StagePayload>) {
        self.status = RunStatus::Offline;
        if payload.is_some() {
            self.payload = payload;
        }
        self.touch();
    }

    pub(crate) fn mark_error(&mut self, message: String, payload: Option<StagePayload>) {
        self.status = RunStatus::Error;
        self.error = Some(message);
        if payload.is_some() {
            self.payload = payload;
        }
        self.touch();
    }

    /// Back to idle, dropping payload and artifact.
    pub(crate) fn invalidate(&mut self) {
        let epoch = self.epoch + 1;
        *self = StageRecord {
            epoch,
            ..StageRecord::default()
        };
    }
}

/// Snapshot of every stage plus the artifacts linking them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub doc_id: Option<String>,
    /// Intermediate output of the preprocess parse sub-step.
    pub enriched_artifact: Option<String>,
    records: [StageRecord; 4],
}

impl PipelineState {
    pub fn record(&self, stage: Stage) -> &StageRecord {
        &self.records[stage.index()]
    }

    pub(crate) fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.records[stage.index()]
    }

    /// Output artifact of a stage, if non-empty.
    pub fn artifact(&self, stage: Stage) -> Option<&str> {
        self.record(stage)
            .artifact
            .as_deref()
            .filter(|a| !a.trim().is_empty())
    }

    /// Current document id, if non-empty.
    pub fn doc_id(&self) -> Option<&str> {
        self.doc_id.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Reset every stage after `stage` to idle and clear the artifacts they own.
    pub(crate) fn reset_downstream(&mut self, stage: Stage) {
        for &next in stage.downstream() {
            self.record_mut(next).invalidate();
            if next == Stage::Preprocess {
                self.enriched_artifact = None;
            }
        }
    }
}

/// Errors raised by stage runs.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Required upstream artifact missing; no request was made.
    #[error("{0}")]
    PreconditionFailed(String),

    /// The stage is already running.
    #[error("{0} stage is already running")]
    AlreadyRunning(Stage),

    /// An upstream stage was rerun while this run was in flight.
    #[error("{0} run was superseded by an upstream rerun")]
    Superseded(Stage),

    /// The orchestrator call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}
