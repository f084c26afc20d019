//! Orchestrator transport.
//!
//! This module provides a `PipelineApi` trait for talking to the remote
//! pipeline orchestrator, and an HTTP implementation on top of `reqwest`.
//! Every call yields a [`Reply`]: either a live payload or the `Offline`
//! sentinel when the client was built in offline mode.

mod http;
mod types;

pub use http::HttpPipelineApi;
pub use types::*;
