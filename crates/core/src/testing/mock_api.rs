//! Mock orchestrator client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::json;
use tokio::sync::Mutex;

use crate::transport::{
    ApiResult, JobSubmission, PipelineApi, Reply, ResponseBody, ResultsPayload, SourceRef,
    StatusPayload,
};

/// Operations the mock can script and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Submit,
    Status,
    Results,
    NormalizeUpload,
    ParseDocument,
    ChunkDocument,
    JoinHeaders,
    RunPasses,
}

/// A recorded call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Submit(SourceRef),
    Status(String),
    Results(String),
    NormalizeUpload(SourceRef),
    ParseDocument { doc_id: String, artifact: String },
    ChunkDocument { doc_id: String, artifact: String },
    JoinHeaders { doc_id: String, artifact: String },
    RunPasses { doc_id: String, artifact: String },
}

impl ApiCall {
    pub fn operation(&self) -> MockOperation {
        match self {
            ApiCall::Submit(_) => MockOperation::Submit,
            ApiCall::Status(_) => MockOperation::Status,
            ApiCall::Results(_) => MockOperation::Results,
            ApiCall::NormalizeUpload(_) => MockOperation::NormalizeUpload,
            ApiCall::ParseDocument { .. } => MockOperation::ParseDocument,
            ApiCall::ChunkDocument { .. } => MockOperation::ChunkDocument,
            ApiCall::JoinHeaders { .. } => MockOperation::JoinHeaders,
            ApiCall::RunPasses { .. } => MockOperation::RunPasses,
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<ApiCall>,
    submit_replies: VecDeque<ApiResult<JobSubmission>>,
    status_replies: VecDeque<ApiResult<StatusPayload>>,
    results_replies: VecDeque<ApiResult<ResultsPayload>>,
    stage_replies: HashMap<MockOperation, VecDeque<ApiResult<ResponseBody>>>,
    delay: Option<Duration>,
    operation_delays: HashMap<MockOperation, Duration>,
}

/// Mock implementation of the PipelineApi trait.
///
/// Provides controllable behavior for testing:
/// - Scripted replies per operation (FIFO), with sensible defaults once drained
/// - Recorded calls in order
/// - Simulated latency
/// - Offline mode that records nothing, like the real client
///
/// Default replies describe a document `mock-doc` whose artifacts live under
/// `/mock/<doc_id>/`.
pub struct MockPipelineApi {
    offline: bool,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPipelineApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPipelineApi {
    /// Create a live mock client.
    pub fn new() -> Self {
        Self {
            offline: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock client in offline mode.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new()
        }
    }

    /// Queue the next `submit` reply.
    pub async fn push_submit(&self, reply: ApiResult<JobSubmission>) {
        self.state.lock().await.submit_replies.push_back(reply);
    }

    /// Queue the next `status` reply.
    pub async fn push_status(&self, reply: ApiResult<StatusPayload>) {
        self.state.lock().await.status_replies.push_back(reply);
    }

    /// Queue the next `results` reply.
    pub async fn push_results(&self, reply: ApiResult<ResultsPayload>) {
        self.state.lock().await.results_replies.push_back(reply);
    }

    /// Queue the next reply for a stage operation.
    pub async fn push_stage(&self, operation: MockOperation, reply: ApiResult<ResponseBody>) {
        self.state
            .lock()
            .await
            .stage_replies
            .entry(operation)
            .or_default()
            .push_back(reply);
    }

    /// Delay every reply.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    /// Delay replies of one operation (overrides the global delay).
    pub async fn set_operation_delay(&self, operation: MockOperation, delay: Duration) {
        self.state
            .lock()
            .await
            .operation_delays
            .insert(operation, delay);
    }

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of recorded calls.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Number of recorded calls for one operation.
    pub async fn calls_for(&self, operation: MockOperation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Record the call and wait out any configured latency.
    async fn record(&self, call: ApiCall) {
        let delay = {
            let mut state = self.state.lock().await;
            let operation = call.operation();
            state.calls.push(call);
            state
                .operation_delays
                .get(&operation)
                .copied()
                .or(state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn next_stage(
        &self,
        operation: MockOperation,
        default: impl FnOnce() -> ResponseBody,
    ) -> ApiResult<ResponseBody> {
        let scripted = self
            .state
            .lock()
            .await
            .stage_replies
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(Reply::Live(default())))
    }
}

#[async_trait]
impl PipelineApi for MockPipelineApi {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_offline(&self) -> bool {
        self.offline
    }

    async fn submit(&self, source: &SourceRef) -> ApiResult<JobSubmission> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::Submit(source.clone())).await;
        let scripted = self.state.lock().await.submit_replies.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Reply::Live(JobSubmission {
                doc_id: Some("mock-doc".to_string()),
                passes: None,
                manifest_path: Some("/mock/mock-doc/passes/manifest.json".to_string()),
            }))
        })
    }

    async fn status(&self, doc_id: &str) -> ApiResult<StatusPayload> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::Status(doc_id.to_string())).await;
        let scripted = self.state.lock().await.status_replies.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Reply::Live(StatusPayload {
                doc_id: Some(doc_id.to_string()),
                ..Default::default()
            }))
        })
    }

    async fn results(&self, doc_id: &str) -> ApiResult<ResultsPayload> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::Results(doc_id.to_string())).await;
        let scripted = self.state.lock().await.results_replies.pop_front();
        scripted.unwrap_or_else(|| Ok(Reply::Live(ResultsPayload::default())))
    }

    async fn normalize_upload(&self, source: &SourceRef) -> ApiResult<ResponseBody> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::NormalizeUpload(source.clone())).await;
        self.next_stage(MockOperation::NormalizeUpload, || {
            ResponseBody::Json(json!({
                "doc_id": "mock-doc",
                "normalized_path": "/mock/mock-doc/normalized.json",
                "manifest_path": "/mock/mock-doc/document.manifest.json",
            }))
        })
        .await
    }

    async fn parse_document(&self, doc_id: &str, normalized_artifact: &str) -> ApiResult<ResponseBody> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::ParseDocument {
            doc_id: doc_id.to_string(),
            artifact: normalized_artifact.to_string(),
        })
        .await;
        self.next_stage(MockOperation::ParseDocument, || {
            ResponseBody::Json(json!({
                "doc_id": doc_id,
                "enriched_path": format!("/mock/{}/enriched.json", doc_id),
            }))
        })
        .await
    }

    async fn chunk_document(&self, doc_id: &str, enriched_artifact: &str) -> ApiResult<ResponseBody> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::ChunkDocument {
            doc_id: doc_id.to_string(),
            artifact: enriched_artifact.to_string(),
        })
        .await;
        self.next_stage(MockOperation::ChunkDocument, || {
            ResponseBody::Json(json!({
                "doc_id": doc_id,
                "chunks_path": format!("/mock/{}/chunks.json", doc_id),
            }))
        })
        .await
    }

    async fn join_headers(&self, doc_id: &str, chunks_artifact: &str) -> ApiResult<ResponseBody> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::JoinHeaders {
            doc_id: doc_id.to_string(),
            artifact: chunks_artifact.to_string(),
        })
        .await;
        self.next_stage(MockOperation::JoinHeaders, || {
            ResponseBody::Json(json!({
                "doc_id": doc_id,
                "header_chunks_path": format!("/mock/{}/headers.json", doc_id),
                "header_count": 3,
            }))
        })
        .await
    }

    async fn run_passes(&self, doc_id: &str, header_chunks_artifact: &str) -> ApiResult<ResponseBody> {
        if self.offline {
            return Ok(Reply::Offline);
        }
        self.record(ApiCall::RunPasses {
            doc_id: doc_id.to_string(),
            artifact: header_chunks_artifact.to_string(),
        })
        .await;
        self.next_stage(MockOperation::RunPasses, || {
            ResponseBody::Json(json!({
                "doc_id": doc_id,
                "passes": {"summary": format!("/mock/{}/passes/summary.json", doc_id)},
                "manifest_path": format!("/mock/{}/passes/manifest.json", doc_id),
            }))
        })
        .await
    }

    fn artifact_url(&self, path: &str) -> Option<Url> {
        if self.offline || path.trim().is_empty() {
            return None;
        }
        Url::parse(&format!(
            "http://mock.local/pipeline/artifacts?path={}",
            urlencoding::encode(path)
        ))
        .ok()
    }
}
