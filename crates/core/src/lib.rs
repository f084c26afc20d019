pub mod config;
pub mod job;
pub mod metrics;
pub mod poller;
pub mod projection;
pub mod session;
pub mod stages;
pub mod testing;
pub mod transport;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
    OrchestratorConfig, SessionConfig,
};
pub use job::{DocumentJob, JobHandle, JobSubmitter, SubmitError};
pub use poller::{
    progress_percent, PollError, PollObserver, PollOutcome, PollSnapshot, PollerConfig,
    ProgressPoller, StopReason,
};
pub use projection::{
    project_passes, project_results, Citation, PassResult, RetrievalEntry, MAX_RETRIEVAL_ENTRIES,
};
pub use session::{remember_doc_id, SessionStore, SessionStoreError, SqliteSessionStore};
pub use stages::{
    PipelineState, PreprocessPayload, RunStatus, Stage, StageError, StageObserver, StagePayload,
    StageRecord, StageRunner,
};
pub use transport::{
    ApiError, ApiResult, HttpPipelineApi, JobSubmission, Manifest, PipelineApi, Reply,
    ResponseBody, ResultsPayload, SourceRef, StatusPayload,
};
