//! Search Backend Module
//!
//! The capability the pagination core consumes from the search engine: open a
//! point-in-time cursor, query one page through it, close it.
//!
//! ## Error classification
//! Engine failures are split into two classes that callers branch on explicitly:
//! - **cursor-invalid**: the engine no longer knows the cursor (expired, closed, or the
//!   search context was lost). Recognized by known phrases in the engine's message.
//! - **everything else**: unavailable engine, transport failures, timeouts, refused
//!   requests, undecodable responses.
//!
//! ## Submodules
//! - **`types`**: keep-alive values and the page query/result shapes.
//! - **`memory`**: an in-process point-in-time engine over a document set.
//! - **`elasticsearch`**: HTTP adapter for an Elasticsearch cluster.

pub mod elasticsearch;
pub mod memory;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;


use crate::cursor::types::CursorId;
use types::{BackendPage, KeepAlive, PageQuery};

use async_trait::async_trait;
use thiserror::Error;

/// Phrases the engine uses when a cursor or its search context no longer exists.
pub const CURSOR_INVALID_PHRASES: &[&str] = &[
    "PIT not found",
    "No search context found",
    "search_context_missing_exception",
];

/// Whether an engine (or server) error message reports a dead cursor.
pub fn is_cursor_invalid_message(message: &str) -> bool {
    CURSOR_INVALID_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The cursor is gone; recoverable by opening a new one.
    #[error("{0}")]
    CursorInvalid(String),

    #[error("{0}")]
    Unavailable(String),

    /// The engine understood the request and refused it.
    #[error("{0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed engine response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Classifies a raw engine failure message.
    pub fn from_engine_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_cursor_invalid_message(&message) {
            BackendError::CursorInvalid(message)
        } else {
            BackendError::Unavailable(message)
        }
    }

    pub fn is_cursor_invalid(&self) -> bool {
        matches!(self, BackendError::CursorInvalid(_))
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Verifies the engine is reachable.
    async fn check_connection(&self) -> Result<(), BackendError>;

    /// Opens a point-in-time cursor kept alive for `keep_alive`.
    async fn open_cursor(&self, keep_alive: KeepAlive) -> Result<CursorId, BackendError>;

    /// Returns the next `limit` records after the query's continuation key.
    ///
    /// The engine may rotate the cursor id; the returned page always carries the latest one.
    async fn query_page(&self, query: PageQuery) -> Result<BackendPage, BackendError>;

    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), BackendError>;
}
