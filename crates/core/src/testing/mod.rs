//! Testing utilities and mock implementations.
//!
//! This module provides a scripted mock of the orchestrator client, allowing
//! stage, submission and polling flows to be tested without a backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use fluidrag_core::testing::{fixtures, MockPipelineApi};
//!
//! let api = MockPipelineApi::new();
//!
//! // Script the next two status/results replies
//! api.push_status(Ok(Reply::Live(fixtures::status("d1")))).await;
//! api.push_results(Ok(Reply::Live(fixtures::results_with_pass("d1", "passA")))).await;
//!
//! // Use as Arc<dyn PipelineApi>...
//! ```

mod mock_api;

pub use mock_api::{ApiCall, MockOperation, MockPipelineApi};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use crate::transport::{
        Manifest, PipelineAudit, RawCitation, RawPassPayload, RawRetrieval, ResultsPayload,
        StatusPayload,
    };

    /// Status payload echoing a doc id and nothing else.
    pub fn status(doc_id: &str) -> StatusPayload {
        StatusPayload {
            doc_id: Some(doc_id.to_string()),
            ..Default::default()
        }
    }

    /// Status payload carrying a stage manifest.
    pub fn status_with_manifest(doc_id: &str) -> StatusPayload {
        StatusPayload {
            manifest: Some(serde_json::json!({
                "normalized_path": format!("/data/{}/normalized.json", doc_id),
            })),
            ..status(doc_id)
        }
    }

    /// Status payload carrying a finished audit record.
    pub fn status_with_audit(doc_id: &str, audit_status: &str) -> StatusPayload {
        StatusPayload {
            pipeline_audit: Some(PipelineAudit {
                status: Some(audit_status.to_string()),
                timestamp: Some("2026-01-01T00:00:00Z".to_string()),
            }),
            ..status_with_manifest(doc_id)
        }
    }

    /// A pass with one citation and one retrieval hit.
    pub fn pass_payload(answer: &str, chunk_id: &str, score: f64) -> RawPassPayload {
        RawPassPayload {
            answer: Some(answer.to_string()),
            citations: Some(vec![RawCitation {
                chunk_id: Some(chunk_id.to_string()),
                header_path: None,
            }]),
            retrieval: Some(vec![RawRetrieval {
                chunk_id: Some(chunk_id.to_string()),
                score: Some(score),
            }]),
        }
    }

    /// Results payload with a single pass and matching manifest entry.
    pub fn results_with_pass(doc_id: &str, pass_name: &str) -> ResultsPayload {
        let mut passes = BTreeMap::new();
        passes.insert(pass_name.to_string(), pass_payload("x", "c1", 0.87));
        let mut manifest = BTreeMap::new();
        manifest.insert(
            pass_name.to_string(),
            format!("/data/{}/passes/{}.json", doc_id, pass_name),
        );
        ResultsPayload {
            doc_id: Some(doc_id.to_string()),
            passes,
            manifest: Some(Manifest { passes: manifest }),
        }
    }

    /// Results payload with no passes yet.
    pub fn empty_results(doc_id: &str) -> ResultsPayload {
        ResultsPayload {
            doc_id: Some(doc_id.to_string()),
            ..Default::default()
        }
    }
}
