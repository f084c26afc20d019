//! Common test utilities for exercising the HTTP client.
//!
//! This module provides an in-process fake orchestrator served with axum on
//! an ephemeral port. It answers the pipeline, status, results and stage
//! endpoints and records every request it receives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use fluidrag_core::{HttpPipelineApi, OrchestratorConfig};

/// A request seen by the fake orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub route: String,
    pub body: Option<Value>,
}

/// Shared fake orchestrator state.
#[derive(Default)]
pub struct FakeState {
    requests: Mutex<Vec<Recorded>>,
    status_calls: Mutex<HashMap<String, u32>>,
    /// Status calls a document needs before results carry passes.
    results_after: u32,
    /// Answer results with 404 until the pass manifest exists.
    manifest_required: bool,
}

impl FakeState {
    fn record(&self, route: impl Into<String>, body: Option<&Value>) {
        self.requests.lock().unwrap().push(Recorded {
            route: route.into(),
            body: body.cloned(),
        });
    }

    fn status_calls(&self, doc_id: &str) -> u32 {
        self.status_calls
            .lock()
            .unwrap()
            .get(doc_id)
            .copied()
            .unwrap_or(0)
    }
}

type Shared = Arc<FakeState>;

/// In-process orchestrator for transport tests.
pub struct FakeOrchestrator {
    pub base_url: String,
    state: Shared,
    handle: JoinHandle<()>,
}

impl FakeOrchestrator {
    /// Serve a fake whose results carry passes from the second status call on.
    pub async fn spawn() -> Self {
        Self::spawn_with_results_after(2).await
    }

    pub async fn spawn_with_results_after(results_after: u32) -> Self {
        Self::serve(FakeState {
            results_after,
            ..Default::default()
        })
        .await
    }

    /// Serve a fake whose results route 404s until passes exist, like the
    /// real orchestrator before the pass manifest is written.
    pub async fn spawn_requiring_manifest(results_after: u32) -> Self {
        Self::serve(FakeState {
            results_after,
            manifest_required: true,
            ..Default::default()
        })
        .await
    }

    async fn serve(state: FakeState) -> Self {
        let state = Arc::new(state);
        let router = Router::new()
            .route("/pipeline/run", post(run_pipeline))
            .route("/pipeline/status/{doc_id}", get(status))
            .route("/pipeline/results/{doc_id}", get(results))
            .route("/upload/normalize", post(normalize))
            .route("/parser/enrich", post(enrich))
            .route("/chunk/uf", post(chunk))
            .route("/headers/", post(headers))
            .route("/passes/", post(passes))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake orchestrator");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 5,
            offline: false,
        }
    }

    pub fn api(&self) -> HttpPipelineApi {
        HttpPipelineApi::new(&self.config()).expect("Failed to create client")
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn routes(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.route).collect()
    }
}

impl Drop for FakeOrchestrator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

async fn run_pipeline(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /pipeline/run", Some(&body));
    let Some(source) = str_field(&body, "file_id").or_else(|| str_field(&body, "file_name")) else {
        return (StatusCode::BAD_REQUEST, "file_id or file_name must be provided").into_response();
    };
    let doc_id = format!("doc-{}", source.replace('.', "-"));
    Json(json!({
        "doc_id": doc_id,
        "passes": {"doc_id": doc_id, "passes": {"summary": format!("/data/{}/passes/summary.json", doc_id)}},
        "manifest_path": format!("/data/{}/passes/manifest.json", doc_id),
    }))
    .into_response()
}

async fn status(State(state): State<Shared>, Path(doc_id): Path<String>) -> Response {
    state.record(format!("GET /pipeline/status/{}", doc_id), None);
    if doc_id == "missing" {
        return (StatusCode::NOT_FOUND, "Unknown document").into_response();
    }
    let calls = {
        let mut counts = state.status_calls.lock().unwrap();
        let count = counts.entry(doc_id.clone()).or_default();
        *count += 1;
        *count
    };
    let mut payload = json!({"doc_id": doc_id, "status": "running"});
    if calls >= 2 {
        payload["manifest"] = json!({"normalized_path": format!("/data/{}/normalized.json", doc_id)});
    }
    Json(payload).into_response()
}

async fn results(State(state): State<Shared>, Path(doc_id): Path<String>) -> Response {
    state.record(format!("GET /pipeline/results/{}", doc_id), None);
    if state.status_calls(&doc_id) < state.results_after {
        if state.manifest_required {
            return (StatusCode::NOT_FOUND, "pass manifest missing").into_response();
        }
        return Json(json!({"doc_id": doc_id, "passes": {}})).into_response();
    }
    Json(json!({
        "doc_id": doc_id,
        "passes": {
            "scope": {
                "answer": "Covers switchgear up to 15 kV.",
                "citations": [{"chunk_id": "c1", "header_path": "1 Scope"}],
                "retrieval": [{"chunk_id": "c1", "score": 0.91}, {"chunk_id": "c4", "score": 0.4}]
            }
        },
        "manifest": {"passes": {"scope": format!("/data/{}/passes/scope.json", doc_id)}}
    }))
    .into_response()
}

async fn normalize(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /upload/normalize", Some(&body));
    let Some(source) = str_field(&body, "file_id").or_else(|| str_field(&body, "file_name")) else {
        return (StatusCode::BAD_REQUEST, "file_id or file_name must be provided").into_response();
    };
    let doc_id = format!("doc-{}", source.replace('.', "-"));
    Json(json!({
        "doc_id": doc_id,
        "normalized_path": format!("/data/{}/normalized.json", doc_id),
        "manifest_path": format!("/data/{}/manifest.json", doc_id),
    }))
    .into_response()
}

async fn enrich(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /parser/enrich", Some(&body));
    let doc_id = str_field(&body, "doc_id").unwrap_or_default().to_string();
    if doc_id == "plain" {
        return (StatusCode::OK, "enriched ok").into_response();
    }
    Json(json!({"doc_id": doc_id, "enriched_path": format!("/data/{}/enriched.json", doc_id)}))
        .into_response()
}

async fn chunk(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /chunk/uf", Some(&body));
    let doc_id = str_field(&body, "doc_id").unwrap_or_default().to_string();
    if doc_id.contains("broken") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "chunker exploded").into_response();
    }
    Json(json!({"doc_id": doc_id, "chunks_path": format!("/data/{}/chunks.json", doc_id)}))
        .into_response()
}

async fn headers(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /headers/", Some(&body));
    let doc_id = str_field(&body, "doc_id").unwrap_or_default().to_string();
    Json(json!({
        "doc_id": doc_id,
        "rechunk_artifact": format!("/data/{}/rechunk.json", doc_id),
        "header_count": 12,
    }))
    .into_response()
}

async fn passes(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.record("POST /passes/", Some(&body));
    let doc_id = str_field(&body, "doc_id").unwrap_or_default().to_string();
    Json(json!({
        "doc_id": doc_id,
        "passes": {"scope": format!("/data/{}/passes/scope.json", doc_id)},
        "manifest_path": format!("/data/{}/passes/manifest.json", doc_id),
    }))
    .into_response()
}
