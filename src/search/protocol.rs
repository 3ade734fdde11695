//! Search HTTP Protocol
//!
//! Endpoints, headers and JSON bodies of the media search API. Shared by the server
//! handlers and the client transport.

use super::types::{MediaItem, PageResponse};
use crate::cursor::types::{ContinuationKey, CursorId};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Prefix the media routes are mounted under.
pub const API_PREFIX: &str = "/api/v1";
pub const ENDPOINT_SEARCH: &str = "/media/search";
pub const ENDPOINT_PIT: &str = "/media/pit";

// --- Headers ---

/// Cursor id the caller is walking with.
pub const HEADER_PIT_ID: &str = "x-pit-id";
/// JSON array of sort values to resume after.
pub const HEADER_SEARCH_AFTER: &str = "x-search-after";
/// Caller-tracked page number.
pub const HEADER_CURRENT_PAGE: &str = "x-current-page";

// --- Data Transfer Objects ---

/// Query string of `GET /media/search`.
///
/// `page` and `limit` stay raw so unparseable values fall back to defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default, rename = "type")]
    pub type_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<MediaItem>,
    pub total: u64,
    pub page: u32,
    pub has_more: bool,
    pub metadata: SearchMetadata,
}

/// Continuation metadata the client echoes back on the next request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    pub pit_id: CursorId,
    #[serde(default)]
    pub search_after: Option<ContinuationKey>,
    pub current_page: u32,
    /// Present (and true) only when the server replaced the caller's cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit_reset: Option<bool>,
}

impl From<PageResponse> for SearchResponse {
    fn from(page: PageResponse) -> Self {
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            has_more: page.has_more,
            metadata: SearchMetadata {
                pit_id: page.continuation.cursor_id,
                search_after: page.continuation.continuation_key,
                current_page: page.page,
                pit_reset: page.reset.then_some(true),
            },
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePitRequest {
    #[serde(default)]
    pub keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePitResponse {
    pub pit_id: CursorId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
