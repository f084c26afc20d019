//! Document job tracking and full-pipeline submission.

mod submitter;
mod types;

pub use submitter::{JobSubmitter, SubmitError};
pub use types::{DocumentJob, JobHandle};
