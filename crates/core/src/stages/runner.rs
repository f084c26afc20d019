//! Stage runner implementation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::metrics;
use crate::transport::{ApiError, PipelineApi, Reply, ResponseBody, SourceRef};

use super::types::{
    PipelineState, PreprocessPayload, RunStatus, Stage, StageError, StagePayload, StageRecord,
};

/// Callback invoked with a fresh snapshot after every state change.
pub type StageObserver = Arc<dyn Fn(&PipelineState) + Send + Sync>;

/// Drives individual stages against the orchestrator and owns their records.
///
/// All mutations go through one mutex that is never held across a request,
/// so concurrent callers observe the same ordering a single event loop would.
pub struct StageRunner {
    api: Arc<dyn PipelineApi>,
    state: Mutex<PipelineState>,
    observer: Option<StageObserver>,
}

/// Inputs captured when a run starts.
struct RunTicket {
    epoch: u64,
    doc_id: String,
    artifact: String,
}

impl StageRunner {
    /// Create a runner with every stage idle.
    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self {
            api,
            state: Mutex::new(PipelineState::default()),
            observer: None,
        }
    }

    /// Attach an observer notified after each record change.
    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PipelineState {
        self.lock().clone()
    }

    /// Copy of one stage record.
    pub fn record(&self, stage: Stage) -> StageRecord {
        self.lock().record(stage).clone()
    }

    /// Document id assigned by the last completed upload.
    pub fn doc_id(&self) -> Option<String> {
        self.lock().doc_id().map(str::to_string)
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a mutation and notify the observer outside the lock.
    fn mutate<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, self.observer.as_ref().map(|_| state.clone()))
        };
        if let (Some(observer), Some(snapshot)) = (&self.observer, snapshot) {
            observer(&snapshot);
        }
        result
    }

    /// Move a stage to running once its inputs are available.
    ///
    /// `inputs` returns the doc id and upstream artifact, or the message to
    /// record when they are missing.
    fn begin(
        &self,
        stage: Stage,
        inputs: impl FnOnce(&PipelineState) -> Result<(String, String), String>,
    ) -> Result<RunTicket, StageError> {
        self.mutate(|state| {
            if state.record(stage).status == RunStatus::Running {
                metrics::STAGE_RUNS
                    .with_label_values(&[stage.as_str(), "rejected"])
                    .inc();
                return Err(StageError::AlreadyRunning(stage));
            }

            match inputs(state) {
                Ok((doc_id, artifact)) => {
                    let record = state.record_mut(stage);
                    record.mark_running();
                    debug!(stage = %stage, doc_id = %doc_id, "Stage started");
                    Ok(RunTicket {
                        epoch: record.epoch,
                        doc_id,
                        artifact,
                    })
                }
                Err(message) => {
                    metrics::STAGE_RUNS
                        .with_label_values(&[stage.as_str(), "precondition_failed"])
                        .inc();
                    warn!(stage = %stage, "{}", message);
                    state.record_mut(stage).mark_error(message.clone(), None);
                    Err(StageError::PreconditionFailed(message))
                }
            }
        })
    }

    /// Record a successful run and invalidate everything downstream.
    fn complete(
        &self,
        stage: Stage,
        ticket: &RunTicket,
        payload: StagePayload,
        artifact: Option<String>,
        extra: impl FnOnce(&mut PipelineState),
    ) -> Result<(), StageError> {
        self.mutate(|state| {
            if state.record(stage).epoch != ticket.epoch {
                info!(stage = %stage, "Discarding result of superseded run");
                return Err(StageError::Superseded(stage));
            }
            state.reset_downstream(stage);
            extra(state);
            state.record_mut(stage).mark_completed(payload, artifact);
            metrics::STAGE_RUNS
                .with_label_values(&[stage.as_str(), "completed"])
                .inc();
            info!(stage = %stage, doc_id = %ticket.doc_id, "Stage completed");
            Ok(())
        })
    }

    /// Record offline mode. Downstream stages are left untouched.
    fn offline(&self, stage: Stage, ticket: &RunTicket, payload: Option<StagePayload>) {
        self.mutate(|state| {
            if state.record(stage).epoch != ticket.epoch {
                return;
            }
            state.record_mut(stage).mark_offline(payload);
            metrics::STAGE_RUNS
                .with_label_values(&[stage.as_str(), "offline"])
                .inc();
            info!(stage = %stage, "Offline mode: stage not executed");
        })
    }

    /// Record a failure and hand the error back for the caller to raise.
    fn fail(
        &self,
        stage: Stage,
        ticket: &RunTicket,
        error: StageError,
        payload: Option<StagePayload>,
    ) -> StageError {
        self.mutate(|state| {
            if state.record(stage).epoch == ticket.epoch {
                state
                    .record_mut(stage)
                    .mark_error(error.to_string(), payload);
            }
        });
        metrics::STAGE_RUNS
            .with_label_values(&[stage.as_str(), "error"])
            .inc();
        warn!(stage = %stage, error = %error, "Stage failed");
        error
    }

    /// Normalize the source document and record the new doc id.
    pub async fn run_upload(&self, source: &SourceRef) -> Result<Reply<ResponseBody>, StageError> {
        let stage = Stage::Upload;
        let ticket = self.begin(stage, |_| {
            if source.is_empty() {
                Err("Enter a document path or ID.".to_string())
            } else {
                Ok((String::new(), source.label().to_string()))
            }
        })?;

        match self.api.normalize_upload(source).await {
            Err(e) => Err(self.fail(stage, &ticket, e.into(), None)),
            Ok(Reply::Offline) => {
                self.offline(stage, &ticket, None);
                Ok(Reply::Offline)
            }
            Ok(Reply::Live(body)) => {
                let doc_id = body.str_field("doc_id").map(str::to_string);
                let artifact = body.str_field("normalized_path").map(str::to_string);
                self.complete(
                    stage,
                    &ticket,
                    StagePayload::Response(body.clone()),
                    artifact,
                    |state| state.doc_id = doc_id,
                )?;
                Ok(Reply::Live(body))
            }
        }
    }

    /// Parse then chunk. Both sub-steps must succeed for the stage to complete.
    pub async fn run_preprocess(&self) -> Result<Reply<PreprocessPayload>, StageError> {
        let stage = Stage::Preprocess;
        let ticket = self.begin(stage, |state| {
            match (state.doc_id(), state.artifact(Stage::Upload)) {
                (Some(doc_id), Some(artifact)) => Ok((doc_id.to_string(), artifact.to_string())),
                _ => Err("Run the upload stage first.".to_string()),
            }
        })?;

        let parse = match self.api.parse_document(&ticket.doc_id, &ticket.artifact).await {
            Err(e) => return Err(self.fail(stage, &ticket, e.into(), None)),
            Ok(Reply::Offline) => {
                let partial = PreprocessPayload::default();
                self.offline(stage, &ticket, Some(StagePayload::Preprocess(partial)));
                return Ok(Reply::Offline);
            }
            Ok(Reply::Live(body)) => body,
        };

        let Some(enriched) = parse
            .str_field("enriched_path")
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
        else {
            let partial = PreprocessPayload {
                parse: Some(parse),
                chunk: None,
            };
            let error = StageError::PreconditionFailed(
                "Parse step returned no enriched artifact.".to_string(),
            );
            return Err(self.fail(
                stage,
                &ticket,
                error,
                Some(StagePayload::Preprocess(partial)),
            ));
        };
        self.mutate(|state| {
            if state.record(stage).epoch == ticket.epoch {
                state.enriched_artifact = Some(enriched.clone());
            }
        });

        let mut payload = PreprocessPayload {
            parse: Some(parse),
            chunk: None,
        };
        match self.api.chunk_document(&ticket.doc_id, &enriched).await {
            Err(e) => Err(self.fail(
                stage,
                &ticket,
                e.into(),
                Some(StagePayload::Preprocess(payload)),
            )),
            Ok(Reply::Offline) => {
                self.offline(stage, &ticket, Some(StagePayload::Preprocess(payload)));
                Ok(Reply::Offline)
            }
            Ok(Reply::Live(body)) => {
                let artifact = body.str_field("chunks_path").map(str::to_string);
                payload.chunk = Some(body);
                self.complete(
                    stage,
                    &ticket,
                    StagePayload::Preprocess(payload.clone()),
                    artifact,
                    |_| {},
                )?;
                Ok(Reply::Live(payload))
            }
        }
    }

    /// Join headers over the chunk artifact.
    pub async fn run_headers(&self) -> Result<Reply<ResponseBody>, StageError> {
        let stage = Stage::Headers;
        let ticket = self.begin(stage, |state| {
            match (state.doc_id(), state.artifact(Stage::Preprocess)) {
                (Some(doc_id), Some(artifact)) => Ok((doc_id.to_string(), artifact.to_string())),
                _ => Err("Run preprocess to generate chunks first.".to_string()),
            }
        })?;

        let reply = self.api.join_headers(&ticket.doc_id, &ticket.artifact).await;
        self.settle(stage, &ticket, reply, |body| {
            body.str_field("header_chunks_path")
                .or_else(|| body.str_field("rechunk_artifact"))
                .map(str::to_string)
        })
    }

    /// Execute the question-answering passes over the header chunks.
    pub async fn run_passes(&self) -> Result<Reply<ResponseBody>, StageError> {
        let stage = Stage::Passes;
        let ticket = self.begin(stage, |state| {
            match (state.doc_id(), state.artifact(Stage::Headers)) {
                (Some(doc_id), Some(artifact)) => Ok((doc_id.to_string(), artifact.to_string())),
                _ => Err("Run header search before executing passes.".to_string()),
            }
        })?;

        let reply = self.api.run_passes(&ticket.doc_id, &ticket.artifact).await;
        self.settle(stage, &ticket, reply, |body| {
            body.str_field("manifest_path").map(str::to_string)
        })
    }

    /// Shared tail for single-request stages.
    fn settle(
        &self,
        stage: Stage,
        ticket: &RunTicket,
        reply: Result<Reply<ResponseBody>, ApiError>,
        artifact_of: impl FnOnce(&ResponseBody) -> Option<String>,
    ) -> Result<Reply<ResponseBody>, StageError> {
        match reply {
            Err(e) => Err(self.fail(stage, ticket, e.into(), None)),
            Ok(Reply::Offline) => {
                self.offline(stage, ticket, None);
                Ok(Reply::Offline)
            }
            Ok(Reply::Live(body)) => {
                let artifact = artifact_of(&body);
                self.complete(
                    stage,
                    ticket,
                    StagePayload::Response(body.clone()),
                    artifact,
                    |_| {},
                )?;
                Ok(Reply::Live(body))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use crate::testing::{ApiCall, MockOperation, MockPipelineApi};

    fn runner(api: &Arc<MockPipelineApi>) -> StageRunner {
        StageRunner::new(Arc::clone(api) as Arc<dyn PipelineApi>)
    }

    async fn run_all(runner: &StageRunner) {
        runner.run_upload(&SourceRef::named("spec.pdf")).await.unwrap();
        runner.run_preprocess().await.unwrap();
        runner.run_headers().await.unwrap();
        runner.run_passes().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_sequence_records_artifacts() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);

        run_all(&runner).await;

        let state = runner.snapshot();
        assert_eq!(state.doc_id(), Some("mock-doc"));
        assert_eq!(state.artifact(Stage::Upload), Some("/mock/mock-doc/normalized.json"));
        assert_eq!(state.enriched_artifact.as_deref(), Some("/mock/mock-doc/enriched.json"));
        assert_eq!(state.artifact(Stage::Preprocess), Some("/mock/mock-doc/chunks.json"));
        assert_eq!(state.artifact(Stage::Headers), Some("/mock/mock-doc/headers.json"));
        assert_eq!(state.artifact(Stage::Passes), Some("/mock/mock-doc/passes/manifest.json"));
        for stage in Stage::ORDER {
            assert_eq!(state.record(stage).status, RunStatus::Completed);
            assert!(state.record(stage).last_updated.is_some());
        }

        let calls = api.calls().await;
        assert_eq!(
            calls[2],
            ApiCall::ChunkDocument {
                doc_id: "mock-doc".into(),
                artifact: "/mock/mock-doc/enriched.json".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_upstream_is_precondition_failure_without_calls() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);

        let err = runner.run_preprocess().await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(ref m) if m == "Run the upload stage first."));
        let err = runner.run_headers().await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
        let err = runner.run_passes().await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
        let err = runner.run_upload(&SourceRef::named("  ")).await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));

        assert_eq!(api.call_count().await, 0);
        for stage in Stage::ORDER {
            let record = runner.record(stage);
            assert_eq!(record.status, RunStatus::Error);
            assert!(record.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_rerun_upload_resets_downstream() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;

        api.push_stage(
            MockOperation::NormalizeUpload,
            Ok(Reply::Live(ResponseBody::Json(json!({
                "doc_id": "doc-2",
                "normalized_path": "/data/doc-2/normalized.json",
            })))),
        )
        .await;
        runner.run_upload(&SourceRef::named("other.pdf")).await.unwrap();

        let state = runner.snapshot();
        assert_eq!(state.doc_id(), Some("doc-2"));
        assert_eq!(state.artifact(Stage::Upload), Some("/data/doc-2/normalized.json"));
        assert!(state.enriched_artifact.is_none());
        for stage in Stage::Upload.downstream() {
            let record = state.record(*stage);
            assert_eq!(record.status, RunStatus::Idle);
            assert!(record.payload.is_none());
            assert!(record.artifact.is_none());
        }
    }

    #[tokio::test]
    async fn test_completing_any_stage_resets_every_later_stage() {
        for stage in Stage::ORDER {
            let api = Arc::new(MockPipelineApi::new());
            let runner = runner(&api);
            run_all(&runner).await;

            match stage {
                Stage::Upload => drop(runner.run_upload(&SourceRef::named("x")).await.unwrap()),
                Stage::Preprocess => drop(runner.run_preprocess().await.unwrap()),
                Stage::Headers => drop(runner.run_headers().await.unwrap()),
                Stage::Passes => drop(runner.run_passes().await.unwrap()),
            }

            let state = runner.snapshot();
            assert_eq!(state.record(stage).status, RunStatus::Completed);
            for later in stage.downstream() {
                assert_eq!(state.record(*later).status, RunStatus::Idle, "{} after {}", later, stage);
                assert!(state.artifact(*later).is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_offline_does_not_invalidate_downstream() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;

        api.push_stage(MockOperation::NormalizeUpload, Ok(Reply::Offline)).await;
        let reply = runner.run_upload(&SourceRef::named("again")).await.unwrap();
        assert!(reply.is_offline());

        let state = runner.snapshot();
        assert_eq!(state.record(Stage::Upload).status, RunStatus::Offline);
        assert_eq!(state.record(Stage::Headers).status, RunStatus::Completed);
        assert_eq!(state.artifact(Stage::Headers), Some("/mock/mock-doc/headers.json"));
    }

    #[tokio::test]
    async fn test_error_is_recorded_and_raised() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;
        let before = runner.record(Stage::Headers).payload;

        api.push_stage(
            MockOperation::JoinHeaders,
            Err(ApiError::RequestFailed {
                status: 500,
                detail: "stitcher crashed".into(),
            }),
        )
        .await;
        let err = runner.run_headers().await.unwrap_err();
        assert!(matches!(err, StageError::Api(ApiError::RequestFailed { status: 500, .. })));

        let record = runner.record(Stage::Headers);
        assert_eq!(record.status, RunStatus::Error);
        assert_eq!(record.error.as_deref(), Some("Request failed: 500 stitcher crashed"));
        assert_eq!(record.payload, before);
        assert_eq!(runner.record(Stage::Passes).status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_preprocess_chunk_failure_keeps_parse_payload() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        runner.run_upload(&SourceRef::named("spec.pdf")).await.unwrap();

        api.push_stage(
            MockOperation::ChunkDocument,
            Err(ApiError::Transport("connection reset".into())),
        )
        .await;
        let err = runner.run_preprocess().await.unwrap_err();
        assert!(matches!(err, StageError::Api(ApiError::Transport(_))));

        let record = runner.record(Stage::Preprocess);
        assert_eq!(record.status, RunStatus::Error);
        assert!(record.artifact.is_none());
        let Some(StagePayload::Preprocess(payload)) = record.payload else {
            panic!("expected preprocess payload");
        };
        assert_eq!(
            payload.parse.unwrap().str_field("enriched_path"),
            Some("/mock/mock-doc/enriched.json")
        );
        assert!(payload.chunk.is_none());
    }

    #[tokio::test]
    async fn test_preprocess_offline_parse_records_empty_payload() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;

        api.push_stage(MockOperation::ParseDocument, Ok(Reply::Offline)).await;
        let reply = runner.run_preprocess().await.unwrap();
        assert!(reply.is_offline());
        assert_eq!(api.calls_for(MockOperation::ChunkDocument).await, 1);

        let record = runner.record(Stage::Preprocess);
        assert_eq!(record.status, RunStatus::Offline);
        assert_eq!(
            record.payload,
            Some(StagePayload::Preprocess(PreprocessPayload::default()))
        );
        assert_eq!(runner.record(Stage::Headers).status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_preprocess_without_enriched_path_skips_chunk() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        runner.run_upload(&SourceRef::named("spec.pdf")).await.unwrap();
        api.push_stage(
            MockOperation::ParseDocument,
            Ok(Reply::Live(ResponseBody::Json(json!({"doc_id": "mock-doc"})))),
        )
        .await;

        let err = runner.run_preprocess().await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
        assert_eq!(api.calls_for(MockOperation::ChunkDocument).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_of_same_stage_is_rejected() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;
        api.set_delay(Duration::from_millis(200)).await;

        let (first, second) = tokio::join!(runner.run_passes(), runner.run_passes());
        assert!(first.is_ok());
        assert!(matches!(second, Err(StageError::AlreadyRunning(Stage::Passes))));
        assert_eq!(api.calls_for(MockOperation::RunPasses).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_rerun_supersedes_in_flight_run() {
        let api = Arc::new(MockPipelineApi::new());
        let runner = runner(&api);
        run_all(&runner).await;
        api.set_operation_delay(MockOperation::RunPasses, Duration::from_millis(500))
            .await;

        let (passes, headers) = tokio::join!(runner.run_passes(), runner.run_headers());
        assert!(headers.is_ok());
        assert!(matches!(passes, Err(StageError::Superseded(Stage::Passes))));
        let record = runner.record(Stage::Passes);
        assert_eq!(record.status, RunStatus::Idle);
        assert!(record.payload.is_none());
    }

    #[tokio::test]
    async fn test_observer_sees_every_transition() {
        let api = Arc::new(MockPipelineApi::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let runner = runner(&api).with_observer(Arc::new(move |state: &PipelineState| {
            if state.record(Stage::Upload).status == RunStatus::Running {
                assert!(state.record(Stage::Upload).error.is_none());
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        runner.run_upload(&SourceRef::named("spec.pdf")).await.unwrap();
        // running + completed
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
