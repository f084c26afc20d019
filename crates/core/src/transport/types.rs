//! Types for orchestrator transport operations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while talking to the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The orchestrator answered with a non-success status.
    #[error("Request failed: {status} {detail}")]
    RequestFailed { status: u16, detail: String },

    /// The request could not be completed at all.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A JSON body did not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

/// Outcome of a transport call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// The client is in offline mode; no request was made.
    Offline,
    /// The orchestrator answered.
    Live(T),
}

impl<T> Reply<T> {
    pub fn is_offline(&self) -> bool {
        matches!(self, Reply::Offline)
    }

    /// Returns the live payload, if any.
    pub fn live(self) -> Option<T> {
        match self {
            Reply::Offline => None,
            Reply::Live(value) => Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Reply::Offline => Reply::Offline,
            Reply::Live(value) => Reply::Live(f(value)),
        }
    }
}

/// Result alias used by every `PipelineApi` call.
pub type ApiResult<T> = Result<Reply<T>, ApiError>;

/// Reference to a source document, by stored file id or by name/path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_id: Option<String>,
    pub file_name: Option<String>,
}

impl SourceRef {
    /// Reference a document by name or path.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            file_id: None,
            file_name: Some(name.into().trim().to_string()),
        }
    }

    /// Reference a previously uploaded file by id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            file_id: Some(id.into().trim().to_string()),
            file_name: None,
        }
    }

    /// True when neither an id nor a name is present.
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.file_id) && blank(&self.file_name)
    }

    /// Human-readable label for logging.
    pub fn label(&self) -> &str {
        self.file_name
            .as_deref()
            .or(self.file_id.as_deref())
            .unwrap_or("")
    }
}

/// Normalized body of a successful response.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    /// 204 or a zero-length body.
    #[default]
    Empty,
    /// Body parsed as JSON.
    Json(Value),
    /// Body that was not JSON, passed through verbatim.
    Text(String),
}

impl ResponseBody {
    /// Classify raw response text.
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            return ResponseBody::Empty;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }

    /// String field of a JSON object body.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        match self {
            ResponseBody::Json(Value::Object(map)) => map.get(key).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Arbitrary field of a JSON object body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            ResponseBody::Json(Value::Object(map)) => map.get(key),
            _ => None,
        }
    }

    /// Decode into a typed payload. Empty and text bodies yield the default.
    pub fn decode<T: DeserializeOwned + Default>(self) -> Result<T, ApiError> {
        match self {
            ResponseBody::Json(value) => {
                serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
            }
            ResponseBody::Empty | ResponseBody::Text(_) => Ok(T::default()),
        }
    }
}

/// Response of `POST /pipeline/run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSubmission {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub passes: Option<Value>,
    #[serde(default)]
    pub manifest_path: Option<String>,
}

/// Audit record written by the orchestrator when a full run finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineAudit {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Response of `GET /pipeline/status/{doc_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub passes: Option<Value>,
    #[serde(default)]
    pub manifest: Option<Value>,
    #[serde(default)]
    pub pipeline_audit: Option<PipelineAudit>,
}

impl StatusPayload {
    /// Audit status string, when non-empty.
    pub fn audit_status(&self) -> Option<&str> {
        self.pipeline_audit
            .as_ref()
            .and_then(|a| a.status.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Whether the orchestrator reported any stage artifacts.
    pub fn has_manifest(&self) -> bool {
        match &self.manifest {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }

    /// Pass artifact paths reported in `passes`, when it is a name to path map.
    ///
    /// Entries whose path is not a non-empty string are skipped.
    pub fn pass_manifest(&self) -> Manifest {
        let passes = match &self.passes {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(name, path)| {
                    path.as_str()
                        .filter(|p| !p.is_empty())
                        .map(|p| (name.clone(), p.to_string()))
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        Manifest { passes }
    }
}

/// Mapping of pass name to stored artifact path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub passes: BTreeMap<String, String>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Citation as returned by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCitation {
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub header_path: Option<String>,
}

/// Retrieval trace entry as returned by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRetrieval {
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// One pass worth of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPassPayload {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<RawCitation>>,
    #[serde(default)]
    pub retrieval: Option<Vec<RawRetrieval>>,
}

/// Response of `GET /pipeline/results/{doc_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsPayload {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub passes: BTreeMap<String, RawPassPayload>,
    #[serde(default)]
    pub manifest: Option<Manifest>,
}

/// Client for the remote pipeline orchestrator.
///
/// Implementations decide offline mode once, at construction. In offline mode
/// every network operation returns `Reply::Offline` without any I/O.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Whether this client was built in offline mode.
    fn is_offline(&self) -> bool;

    /// Run the full pipeline for a document.
    async fn submit(&self, source: &SourceRef) -> ApiResult<JobSubmission>;

    /// Fetch aggregate status for a document.
    async fn status(&self, doc_id: &str) -> ApiResult<StatusPayload>;

    /// Fetch per-pass results for a document.
    async fn results(&self, doc_id: &str) -> ApiResult<ResultsPayload>;

    /// Normalize an upload. Yields `doc_id`, `normalized_path`, `manifest_path`.
    async fn normalize_upload(&self, source: &SourceRef) -> ApiResult<ResponseBody>;

    /// Parse and enrich a normalized document. Yields `enriched_path`.
    async fn parse_document(&self, doc_id: &str, normalized_artifact: &str)
        -> ApiResult<ResponseBody>;

    /// Chunk an enriched document. Yields `chunks_path`.
    async fn chunk_document(&self, doc_id: &str, enriched_artifact: &str)
        -> ApiResult<ResponseBody>;

    /// Join headers over chunks. Yields `header_chunks_path`.
    async fn join_headers(&self, doc_id: &str, chunks_artifact: &str) -> ApiResult<ResponseBody>;

    /// Execute passes over header chunks. Yields `passes` and `manifest_path`.
    async fn run_passes(&self, doc_id: &str, header_chunks_artifact: &str)
        -> ApiResult<ResponseBody>;

    /// Resolve an artifact path to a download URL. `None` when unavailable.
    fn artifact_url(&self, path: &str) -> Option<Url>;
}
