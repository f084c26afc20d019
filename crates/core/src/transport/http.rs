//! HTTP implementation of the orchestrator client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::metrics;

use super::{
    ApiError, ApiResult, JobSubmission, PipelineApi, Reply, ResponseBody, ResultsPayload,
    SourceRef, StatusPayload,
};

/// `reqwest`-backed orchestrator client.
pub struct HttpPipelineApi {
    client: Client,
    base_url: String,
    offline: bool,
}

impl HttpPipelineApi {
    /// Create a new client. Offline mode is fixed for the lifetime of the client.
    pub fn new(config: &OrchestratorConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {}", e)))?;

        if config.offline {
            debug!("Orchestrator client created in offline mode");
        }

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            offline: config.offline,
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Issue a request and normalize the response.
    async fn request(
        &self,
        operation: &str,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> ApiResult<ResponseBody> {
        if self.offline {
            debug!(operation, "Offline mode: skipping network request");
            metrics::TRANSPORT_REQUESTS
                .with_label_values(&[operation, "offline"])
                .inc();
            return Ok(Reply::Offline);
        }

        let url = format!("{}{}", self.base_url(), endpoint);
        let started = Instant::now();
        let result = self.send(method, &url, body).await;
        metrics::TRANSPORT_DURATION
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "success",
            Err(ApiError::RequestFailed { .. }) => "request_failed",
            Err(_) => "transport_error",
        };
        metrics::TRANSPORT_REQUESTS
            .with_label_values(&[operation, outcome])
            .inc();

        if let Err(e) = &result {
            warn!(operation, url = %url, error = %e, "Orchestrator request failed");
        }
        result.map(Reply::Live)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<ResponseBody, ApiError> {
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Transport(format!("request timed out: {}", e))
            } else if e.is_connect() {
                ApiError::Transport(format!("connection failed: {}", e))
            } else {
                ApiError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                detail: text,
            });
        }

        if status.as_u16() == 204 {
            return Ok(ResponseBody::Empty);
        }
        Ok(ResponseBody::from_text(text))
    }

    async fn post(&self, operation: &str, endpoint: &str, body: Value) -> ApiResult<ResponseBody> {
        self.request(operation, Method::POST, endpoint, Some(body))
            .await
    }

    async fn get(&self, operation: &str, endpoint: &str) -> ApiResult<ResponseBody> {
        self.request(operation, Method::GET, endpoint, None).await
    }
}

fn source_body(source: &SourceRef) -> Value {
    json!({ "file_id": source.file_id, "file_name": source.file_name })
}

#[async_trait]
impl PipelineApi for HttpPipelineApi {
    fn name(&self) -> &str {
        "http"
    }

    fn is_offline(&self) -> bool {
        self.offline
    }

    async fn submit(&self, source: &SourceRef) -> ApiResult<JobSubmission> {
        match self
            .post("submit", "/pipeline/run", source_body(source))
            .await?
        {
            Reply::Offline => Ok(Reply::Offline),
            Reply::Live(body) => Ok(Reply::Live(body.decode()?)),
        }
    }

    async fn status(&self, doc_id: &str) -> ApiResult<StatusPayload> {
        let endpoint = format!("/pipeline/status/{}", urlencoding::encode(doc_id));
        match self.get("status", &endpoint).await? {
            Reply::Offline => Ok(Reply::Offline),
            Reply::Live(body) => Ok(Reply::Live(body.decode()?)),
        }
    }

    async fn results(&self, doc_id: &str) -> ApiResult<ResultsPayload> {
        let endpoint = format!("/pipeline/results/{}", urlencoding::encode(doc_id));
        match self.get("results", &endpoint).await? {
            Reply::Offline => Ok(Reply::Offline),
            Reply::Live(body) => Ok(Reply::Live(body.decode()?)),
        }
    }

    async fn normalize_upload(&self, source: &SourceRef) -> ApiResult<ResponseBody> {
        self.post("normalize_upload", "/upload/normalize", source_body(source))
            .await
    }

    async fn parse_document(
        &self,
        doc_id: &str,
        normalized_artifact: &str,
    ) -> ApiResult<ResponseBody> {
        self.post(
            "parse_document",
            "/parser/enrich",
            json!({ "doc_id": doc_id, "normalize_artifact": normalized_artifact }),
        )
        .await
    }

    async fn chunk_document(&self, doc_id: &str, enriched_artifact: &str) -> ApiResult<ResponseBody> {
        self.post(
            "chunk_document",
            "/chunk/uf",
            json!({ "doc_id": doc_id, "normalize_artifact": enriched_artifact }),
        )
        .await
    }

    async fn join_headers(&self, doc_id: &str, chunks_artifact: &str) -> ApiResult<ResponseBody> {
        self.post(
            "join_headers",
            "/headers/",
            json!({ "doc_id": doc_id, "chunks_artifact": chunks_artifact }),
        )
        .await
    }

    async fn run_passes(
        &self,
        doc_id: &str,
        header_chunks_artifact: &str,
    ) -> ApiResult<ResponseBody> {
        self.post(
            "run_passes",
            "/passes/",
            json!({ "doc_id": doc_id, "rechunk_artifact": header_chunks_artifact }),
        )
        .await
    }

    fn artifact_url(&self, path: &str) -> Option<Url> {
        if self.offline || path.trim().is_empty() {
            return None;
        }
        Url::parse(&format!(
            "{}/pipeline/artifacts?path={}",
            self.base_url(),
            urlencoding::encode(path)
        ))
        .ok()
    }
}
