use crate::cursor::types::{ContinuationKey, CursorHandle, CursorId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A mirrored cursor handle as persisted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorEntry {
    pub cursor_id: CursorId,
    #[serde(default)]
    pub continuation_key: Option<ContinuationKey>,
    /// When this cursor was first mirrored (ms since epoch).
    pub timestamp: u64,
    /// Last page served on this cursor.
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

impl MirrorEntry {
    pub fn handle(&self) -> CursorHandle {
        CursorHandle {
            cursor_id: self.cursor_id.clone(),
            continuation_key: self.continuation_key.clone(),
        }
    }
}

/// One page request as sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub type_filter: Option<String>,
    pub page: u32,
    pub limit: usize,
    pub cursor_id: Option<CursorId>,
    pub continuation_key: Option<ContinuationKey>,
    pub page_hint: Option<u32>,
}

/// Result of a single `fetch_next` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was served and its items appended.
    Fetched { page: u32, appended: usize, reset: bool },
    /// The walk has no further pages.
    Exhausted,
    /// Another fetch for this walk is still running; nothing was requested.
    InFlight,
}

/// Backoff for page requests that failed with a retryable error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), doubled each time, capped, plus jitter.
    pub fn delay(&self, retry: usize) -> Duration {
        let factor = 1u32 << retry.min(16) as u32;
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_cap = (backoff.as_millis() as u64 / 10).max(1);
        backoff + Duration::from_millis(rand::random::<u64>() % jitter_cap)
    }
}
