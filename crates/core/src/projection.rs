//! Render-ready view of per-pass results.
//!
//! Projection is pure: raw pass payloads plus a manifest of artifact paths in,
//! one [`PassResult`] per pass out. Missing fields become empty values.

use serde::Serialize;

use crate::transport::{Manifest, RawPassPayload, ResultsPayload};

/// Retrieval entries kept per pass.
pub const MAX_RETRIEVAL_ENTRIES: usize = 5;

/// A citation backing an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub header_path: Option<String>,
}

impl Citation {
    /// `chunk_id`, followed by ` @ header_path` when a header path is known.
    pub fn display(&self) -> String {
        match self.header_path.as_deref().filter(|h| !h.is_empty()) {
            Some(header) => format!("{} @ {}", self.chunk_id, header),
            None => self.chunk_id.clone(),
        }
    }
}

/// One retrieval hit, in backend order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalEntry {
    pub chunk_id: String,
    pub score: f64,
}

impl RetrievalEntry {
    /// `chunk_id (score)` with the score at two decimals.
    pub fn display(&self) -> String {
        format!("{} ({:.2})", self.chunk_id, self.score)
    }
}

/// Display-ready result of a single pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassResult {
    pub name: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub retrieval: Vec<RetrievalEntry>,
    /// Stored artifact for this pass, from the manifest.
    pub artifact: Option<String>,
}

impl PassResult {
    fn from_raw(name: &str, raw: &RawPassPayload, manifest: &Manifest) -> Self {
        let citations = raw
            .citations
            .iter()
            .flatten()
            .map(|c| Citation {
                chunk_id: c.chunk_id.clone().unwrap_or_default(),
                header_path: c.header_path.clone(),
            })
            .collect();

        let retrieval = raw
            .retrieval
            .iter()
            .flatten()
            .take(MAX_RETRIEVAL_ENTRIES)
            .map(|r| RetrievalEntry {
                chunk_id: r.chunk_id.clone().unwrap_or_default(),
                score: r.score.unwrap_or_default(),
            })
            .collect();

        Self {
            name: name.to_string(),
            answer: raw.answer.clone().unwrap_or_default(),
            citations,
            retrieval,
            artifact: manifest
                .passes
                .get(name)
                .filter(|p| !p.is_empty())
                .cloned(),
        }
    }
}

/// Project raw pass payloads into display records, ordered by pass name.
pub fn project_passes(
    passes: &std::collections::BTreeMap<String, RawPassPayload>,
    manifest: &Manifest,
) -> Vec<PassResult> {
    passes
        .iter()
        .map(|(name, raw)| PassResult::from_raw(name, raw, manifest))
        .collect()
}

/// Project a results payload, preferring its own manifest over `fallback`.
pub fn project_results(results: &ResultsPayload, fallback: &Manifest) -> Vec<PassResult> {
    let manifest = results
        .manifest
        .as_ref()
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback);
    project_passes(&results.passes, manifest)
}
