//! Client-side persistence of the most recently used document id.

mod sqlite;

pub use sqlite::SqliteSessionStore;

use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the last document id is stored.
pub const LAST_DOC_ID_KEY: &str = "fluidrag:lastDocId";

/// Error type for session store operations.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Key-value store for session state that outlives a single run.
pub trait SessionStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionStoreError>;

    /// Most recently used document id, if any.
    fn last_doc_id(&self) -> Result<Option<String>, SessionStoreError> {
        Ok(self
            .get(LAST_DOC_ID_KEY)?
            .filter(|id| !id.trim().is_empty()))
    }

    /// Remember the most recently used document id.
    fn set_last_doc_id(&self, doc_id: &str) -> Result<(), SessionStoreError> {
        self.set(LAST_DOC_ID_KEY, doc_id)
    }
}

/// Persist a doc id, logging instead of failing when the store rejects it.
pub fn remember_doc_id(store: &dyn SessionStore, doc_id: &str) {
    if doc_id.trim().is_empty() {
        return;
    }
    match store.set_last_doc_id(doc_id) {
        Ok(()) => debug!(doc_id, "Persisted last doc id"),
        Err(e) => warn!(doc_id, error = %e, "Unable to persist doc id"),
    }
}
