//! `stages` command implementation.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use fluidrag_core::{remember_doc_id, PipelineState, SourceRef, Stage, StageError, StageRunner};

use super::AppContext;
use crate::cli::{StageArg, StagesArgs};
use crate::render;

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Upload => Stage::Upload,
            StageArg::Preprocess => Stage::Preprocess,
            StageArg::Headers => Stage::Headers,
            StageArg::Passes => Stage::Passes,
        }
    }
}

/// Execute the `stages` command
pub async fn run_stages(ctx: &AppContext, args: &StagesArgs) -> Result<()> {
    let runner = StageRunner::new(Arc::clone(&ctx.api)).with_observer(Arc::new(
        |state: &PipelineState| {
            tracing::debug!(doc_id = ?state.doc_id(), "Stage state changed");
        },
    ));
    let source = args.source.to_source_ref();
    let until = Stage::from(args.until);

    for stage in Stage::ORDER {
        if stage > until {
            break;
        }
        info!(stage = %stage, "Running stage");
        let offline = match run_one(&runner, stage, &source).await {
            Ok(offline) => offline,
            Err(e) => {
                println!("{}", render::stage_line(stage, &runner.record(stage)));
                return Err(e.into());
            }
        };
        println!("{}", render::stage_line(stage, &runner.record(stage)));

        if stage == Stage::Upload {
            if let (Some(store), Some(doc_id)) = (&ctx.store, runner.doc_id()) {
                remember_doc_id(store.as_ref(), &doc_id);
            }
        }
        if offline {
            println!("Offline mode: remaining stages skipped.");
            break;
        }
    }
    Ok(())
}

/// Run a single stage; `Ok(true)` when the client is offline.
async fn run_one(
    runner: &StageRunner,
    stage: Stage,
    source: &SourceRef,
) -> Result<bool, StageError> {
    let offline = match stage {
        Stage::Upload => runner.run_upload(source).await?.is_offline(),
        Stage::Preprocess => runner.run_preprocess().await?.is_offline(),
        Stage::Headers => runner.run_headers().await?.is_offline(),
        Stage::Passes => runner.run_passes().await?.is_offline(),
    };
    Ok(offline)
}
