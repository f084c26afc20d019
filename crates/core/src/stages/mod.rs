//! Stage state machine for manually stepping a document through the pipeline.
//!
//! Stages run in a fixed order: upload → preprocess → headers → passes.
//! Each stage consumes the artifact recorded by the stage before it, and
//! completing a stage invalidates every stage after it.

mod runner;
mod types;

pub use runner::{StageObserver, StageRunner};
pub use types::*;
