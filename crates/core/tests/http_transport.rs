//! HTTP client integration tests against an in-process fake orchestrator.
//!
//! These tests verify:
//! - Request shapes for submission and stage endpoints
//! - Non-2xx responses surfacing as `RequestFailed` with the body text
//! - Non-JSON success bodies passed through as text
//! - Stage runner and poller driven end to end over HTTP

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use fluidrag_core::{
    ApiError, JobHandle, PipelineApi, PollError, PollObserver, PollSnapshot, PollerConfig,
    ProgressPoller,
    Reply, ResponseBody, RunStatus, SourceRef, Stage, StageError, StageRunner, StopReason,
};

use common::FakeOrchestrator;

#[tokio::test]
async fn test_submit_decodes_submission() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let submission = api
        .submit(&SourceRef::named("spec.pdf"))
        .await
        .unwrap()
        .live()
        .unwrap();

    assert_eq!(submission.doc_id.as_deref(), Some("doc-spec-pdf"));
    assert_eq!(
        submission.manifest_path.as_deref(),
        Some("/data/doc-spec-pdf/passes/manifest.json")
    );
    let requests = fake.requests();
    assert_eq!(requests[0].route, "POST /pipeline/run");
    assert_eq!(
        requests[0].body,
        Some(json!({"file_id": null, "file_name": "spec.pdf"}))
    );
}

#[tokio::test]
async fn test_non_success_status_is_request_failed() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let err = api.status("missing").await.unwrap_err();
    match &err {
        ApiError::RequestFailed { status, detail } => {
            assert_eq!(*status, 404);
            assert_eq!(detail, "Unknown document");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "Request failed: 404 Unknown document");
}

#[tokio::test]
async fn test_bad_request_detail_passed_through() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let err = api.submit(&SourceRef::default()).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::RequestFailed { status: 400, ref detail } if detail.contains("file_id or file_name")
    ));
}

#[tokio::test]
async fn test_text_body_passed_through() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let body = api
        .parse_document("plain", "/data/plain/normalized.json")
        .await
        .unwrap()
        .live()
        .unwrap();
    assert_eq!(body, ResponseBody::Text("enriched ok".to_string()));
}

#[tokio::test]
async fn test_doc_ids_are_url_encoded() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let status = api.status("doc with space").await.unwrap().live().unwrap();
    assert_eq!(status.doc_id.as_deref(), Some("doc with space"));
    assert_eq!(status.status.as_deref(), Some("running"));
}

#[tokio::test]
async fn test_concurrent_status_requests() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let ids = ["a", "b", "c", "d"];
    let replies = futures::future::join_all(ids.iter().map(|id| api.status(id))).await;

    for (id, reply) in ids.iter().zip(replies) {
        let status = reply.unwrap().live().unwrap();
        assert_eq!(status.doc_id.as_deref(), Some(*id));
    }
    assert_eq!(fake.requests().len(), ids.len());
}

#[tokio::test]
async fn test_artifact_url_points_at_artifact_endpoint() {
    let fake = FakeOrchestrator::spawn().await;
    let api = fake.api();

    let url = api.artifact_url("/data/d1/passes/scope.json").unwrap();
    assert_eq!(
        url.as_str(),
        format!(
            "{}/pipeline/artifacts?path=%2Fdata%2Fd1%2Fpasses%2Fscope.json",
            fake.base_url
        )
    );
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn test_stage_sequence_over_http() {
    let fake = FakeOrchestrator::spawn().await;
    let runner = StageRunner::new(Arc::new(fake.api()));

    runner.run_upload(&SourceRef::named("spec.pdf")).await.unwrap();
    runner.run_preprocess().await.unwrap();
    runner.run_headers().await.unwrap();
    runner.run_passes().await.unwrap();

    let state = runner.snapshot();
    for stage in Stage::ORDER {
        assert_eq!(state.record(stage).status, RunStatus::Completed, "{stage}");
    }
    assert_eq!(state.doc_id(), Some("doc-spec-pdf"));
    assert_eq!(
        state.artifact(Stage::Headers),
        Some("/data/doc-spec-pdf/rechunk.json")
    );
    assert_eq!(
        state.artifact(Stage::Passes),
        Some("/data/doc-spec-pdf/passes/manifest.json")
    );

    assert_eq!(
        fake.routes(),
        vec![
            "POST /upload/normalize",
            "POST /parser/enrich",
            "POST /chunk/uf",
            "POST /headers/",
            "POST /passes/",
        ]
    );
    let requests = fake.requests();
    assert_eq!(
        requests[2].body,
        Some(json!({"doc_id": "doc-spec-pdf", "normalize_artifact": "/data/doc-spec-pdf/enriched.json"}))
    );
    assert_eq!(
        requests[4].body,
        Some(json!({"doc_id": "doc-spec-pdf", "rechunk_artifact": "/data/doc-spec-pdf/rechunk.json"}))
    );
}

#[tokio::test]
async fn test_preprocess_chunk_failure_keeps_parse_payload() {
    let fake = FakeOrchestrator::spawn().await;
    let runner = StageRunner::new(Arc::new(fake.api()));

    runner.run_upload(&SourceRef::named("broken.pdf")).await.unwrap();
    let err = runner.run_preprocess().await.unwrap_err();
    assert!(matches!(
        err,
        StageError::Api(ApiError::RequestFailed { status: 500, .. })
    ));

    let record = runner.record(Stage::Preprocess);
    assert_eq!(record.status, RunStatus::Error);
    assert_eq!(
        record.error.as_deref(),
        Some("Request failed: 500 chunker exploded")
    );
    let payload = record.payload.expect("partial payload");
    assert_eq!(
        payload.str_field("enriched_path"),
        Some("/data/doc-broken-pdf/enriched.json")
    );
    assert!(runner.snapshot().artifact(Stage::Preprocess).is_none());
}

#[tokio::test]
async fn test_poller_over_http_until_passes_ready() {
    let fake = FakeOrchestrator::spawn_with_results_after(3).await;
    let poller = ProgressPoller::new(
        Arc::new(fake.api()),
        &PollerConfig { interval_ms: 10 },
        JobHandle::default(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: PollObserver = Arc::new(move |s: &PollSnapshot| {
        sink.lock().unwrap().push(s.progress);
    });

    let outcome = poller
        .run("d1", &CancellationToken::new(), &observer)
        .await
        .unwrap();

    assert_eq!(outcome.reason, StopReason::PassesReady);
    assert_eq!(*seen.lock().unwrap(), vec![40, 80, 100]);
    let pass = &outcome.snapshot.passes[0];
    assert_eq!(pass.name, "scope");
    assert_eq!(pass.citations[0].display(), "c1 @ 1 Scope");
    assert_eq!(pass.retrieval[1].display(), "c4 (0.40)");
    assert_eq!(pass.artifact.as_deref(), Some("/data/d1/passes/scope.json"));

    let job = poller.job().get();
    assert_eq!(job.doc_id.as_deref(), Some("d1"));
    assert_eq!(job.status, RunStatus::Completed);
    assert_eq!(job.remote_status.as_deref(), Some("running"));
}

#[tokio::test]
async fn test_poller_records_missing_manifest_404_on_job() {
    let fake = FakeOrchestrator::spawn_requiring_manifest(3).await;
    let poller = ProgressPoller::new(
        Arc::new(fake.api()),
        &PollerConfig { interval_ms: 10 },
        JobHandle::default(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: PollObserver = Arc::new(move |s: &PollSnapshot| {
        sink.lock().unwrap().push(s.progress);
    });

    let err = poller
        .run("d1", &CancellationToken::new(), &observer)
        .await
        .unwrap_err();

    match &err {
        PollError::Api(ApiError::RequestFailed { status, detail }) => {
            assert_eq!(*status, 404);
            assert_eq!(detail, "pass manifest missing");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(
        fake.routes(),
        vec!["GET /pipeline/status/d1", "GET /pipeline/results/d1"]
    );

    let job = poller.job().get();
    assert_eq!(job.status, RunStatus::Error);
    assert_eq!(
        job.error.as_deref(),
        Some("Request failed: 404 pass manifest missing")
    );
    assert_eq!(job.remote_status.as_deref(), Some("running"));
}

#[tokio::test]
async fn test_offline_client_never_touches_network() {
    let fake = FakeOrchestrator::spawn().await;
    let mut config = fake.config();
    config.offline = true;
    let api = fluidrag_core::HttpPipelineApi::new(&config).unwrap();

    assert!(matches!(api.submit(&SourceRef::named("x")).await, Ok(Reply::Offline)));
    assert!(matches!(api.status("d1").await, Ok(Reply::Offline)));
    assert!(matches!(api.results("d1").await, Ok(Reply::Offline)));
    assert!(api.artifact_url("/data/x").is_none());
    assert!(fake.requests().is_empty());
}
