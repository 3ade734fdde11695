use crate::cursor::types::{ContinuationKey, CursorHandle, CursorId};
use serde::{Deserialize, Serialize};

/// A media record as stored in the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    /// Engine document id.
    #[serde(default)]
    pub id: String,
    pub bildnummer: String,
    #[serde(default)]
    pub datum: Option<String>,
    #[serde(default)]
    pub suchtext: Option<String>,
    #[serde(default)]
    pub fotografen: Option<String>,
    #[serde(default)]
    pub hoehe: Option<String>,
    #[serde(default)]
    pub breite: Option<String>,
    /// Media type (`st`, `sp`, ...); what the type filter matches against.
    #[serde(default)]
    pub db: Option<String>,
}

/// One page request as seen by the pagination coordinator.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub query: String,
    pub type_filter: Option<String>,
    /// Raw `page` query parameter.
    pub requested_page: u32,
    pub limit: usize,
    /// Cursor the caller is walking with (`x-pit-id`).
    pub cursor_id: Option<CursorId>,
    /// Where the caller's walk left off (`x-search-after`).
    pub continuation_key: Option<ContinuationKey>,
    /// Caller-tracked page number (`x-current-page`).
    pub page_hint: Option<u32>,
}

impl PageRequest {
    pub fn first_page(query: &str, type_filter: Option<&str>, limit: usize) -> Self {
        Self {
            query: query.to_string(),
            type_filter: type_filter.map(str::to_string),
            requested_page: 1,
            limit,
            cursor_id: None,
            continuation_key: None,
            page_hint: None,
        }
    }
}

/// The coordinator's answer for one page.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub items: Vec<MediaItem>,
    pub total: u64,
    pub page: u32,
    pub has_more: bool,
    /// Latest cursor id and the key to resume after this page.
    pub continuation: CursorHandle,
    /// The caller's cursor was discarded and replaced; numbering restarted at 1.
    pub reset: bool,
}
