//! Progress polling for a submitted document.
//!
//! A [`ProgressPoller`] repeatedly fetches status and results until pass
//! results appear, the orchestrator records a terminal audit, the client is
//! offline, or the session is cancelled. Every tick reports a [`PollSnapshot`]
//! to the observer.

mod config;
mod runner;
mod types;

pub use config::PollerConfig;
pub use runner::ProgressPoller;
pub use types::*;
