//! Plain-text rendering of pipeline state.

use fluidrag_core::{
    PassResult, PipelineApi, PollOutcome, PollSnapshot, Stage, StageRecord, StopReason,
};

/// One line per poll tick.
pub fn progress_line(snapshot: &PollSnapshot) -> String {
    if snapshot.offline {
        return format!("[{}] Offline mode: orchestrator not contacted", snapshot.doc_id);
    }
    let status = snapshot
        .audit_status()
        .or_else(|| snapshot.status.as_ref().and_then(|s| s.status.as_deref()))
        .unwrap_or("pending");
    format!(
        "[{}] tick {}: {:>3}% ({})",
        snapshot.doc_id, snapshot.tick, snapshot.progress, status
    )
}

pub fn outcome_summary(outcome: &PollOutcome) -> String {
    let snapshot = &outcome.snapshot;
    match outcome.reason {
        StopReason::PassesReady => format!(
            "{}: {} pass result(s) ready",
            snapshot.doc_id,
            snapshot.passes.len()
        ),
        StopReason::TerminalAudit => format!(
            "{}: pipeline finished with status {}",
            snapshot.doc_id,
            snapshot.audit_status().unwrap_or_default()
        ),
        StopReason::Offline => format!("{}: offline, nothing polled", snapshot.doc_id),
        StopReason::Cancelled => format!(
            "{}: polling cancelled after {} tick(s)",
            snapshot.doc_id, snapshot.tick
        ),
    }
}

/// Answers, citations, retrieval trace and artifact links for each pass.
pub fn pass_results(passes: &[PassResult], api: &dyn PipelineApi) -> String {
    let mut blocks = Vec::with_capacity(passes.len());
    for pass in passes {
        let mut lines = vec![format!("== {} ==", pass.name), pass.answer.clone()];
        if !pass.citations.is_empty() {
            let citations: Vec<_> = pass.citations.iter().map(|c| c.display()).collect();
            lines.push(format!("Citations: {}", citations.join(", ")));
        }
        if !pass.retrieval.is_empty() {
            let hits: Vec<_> = pass.retrieval.iter().map(|r| r.display()).collect();
            lines.push(format!("Retrieval: {}", hits.join(", ")));
        }
        if let Some(artifact) = &pass.artifact {
            match api.artifact_url(artifact) {
                Some(url) => lines.push(format!("Artifact: {} ({})", artifact, url)),
                None => lines.push(format!("Artifact: {}", artifact)),
            }
        }
        blocks.push(lines.join("\n"));
    }
    blocks.join("\n\n")
}

/// Stage name, status, then the artifact or error.
pub fn stage_line(stage: Stage, record: &StageRecord) -> String {
    let detail = match (&record.error, &record.artifact) {
        (Some(error), _) => error.clone(),
        (None, Some(artifact)) => artifact.clone(),
        (None, None) => String::new(),
    };
    format!("{:<10} {:<9} {}", stage.as_str(), record.status.as_str(), detail)
        .trim_end()
        .to_string()
}
