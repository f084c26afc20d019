//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Transport (orchestrator requests, latency)
//! - Stage runs and full-pipeline submissions
//! - Progress polling (ticks, sessions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Transport Metrics
// =============================================================================

/// Orchestrator requests total by operation and outcome.
pub static TRANSPORT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fluidrag_transport_requests_total",
            "Total orchestrator requests",
        ),
        &["operation", "result"], // "success", "offline", "request_failed", "transport_error"
    )
    .unwrap()
});

/// Orchestrator request duration in seconds.
pub static TRANSPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "fluidrag_transport_duration_seconds",
            "Duration of orchestrator requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage runs total by stage and outcome.
pub static STAGE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fluidrag_stage_runs_total", "Total stage runs"),
        &["stage", "result"], // "completed", "offline", "error", "precondition_failed", "rejected"
    )
    .unwrap()
});

/// Full-pipeline submissions total by outcome.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fluidrag_submissions_total",
            "Total full-pipeline submissions",
        ),
        &["result"], // "completed", "offline", "error", "rejected"
    )
    .unwrap()
});

// =============================================================================
// Poller Metrics
// =============================================================================

/// Poll ticks total.
pub static POLL_TICKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("fluidrag_poll_ticks_total", "Total progress poll ticks").unwrap()
});

/// Poll sessions total by how they ended.
pub static POLL_SESSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fluidrag_poll_sessions_total", "Total poll sessions"),
        &["outcome"], // "passes_ready", "terminal_audit", "offline", "cancelled", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Transport
        Box::new(TRANSPORT_REQUESTS.clone()),
        Box::new(TRANSPORT_DURATION.clone()),
        // Stages
        Box::new(STAGE_RUNS.clone()),
        Box::new(SUBMISSIONS.clone()),
        // Poller
        Box::new(POLL_TICKS.clone()),
        Box::new(POLL_SESSIONS.clone()),
    ]
}
