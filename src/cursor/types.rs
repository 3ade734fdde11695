use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Safety margin after which a cached cursor is treated as stale.
///
/// The engine keeps a cursor alive for [`ENGINE_KEEP_ALIVE`]; reusing a handle
/// past this margin would race the engine's own expiry.
pub const CURSOR_TTL_MARGIN: Duration = Duration::from_secs(4 * 60);

/// Keep-alive window requested from the engine when opening a cursor.
pub const ENGINE_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);

/// Opaque cursor identifier issued by the search engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CursorId(pub String);

impl CursorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CursorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Sort values of the last record of a page.
///
/// Only the backend interprets the values; everything else passes them through
/// as an ordered JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContinuationKey(pub Vec<serde_json::Value>);

impl ContinuationKey {
    /// Parses the `x-search-after` header value. Anything other than a JSON array is rejected.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<serde_json::Value>>(raw).map(Self)
    }

    /// Renders the key back into its header form.
    ///
    /// Header values must be visible ASCII, so non-ASCII characters are written as
    /// JSON `\uXXXX` escapes; [`parse`](Self::parse) reads them back unchanged.
    pub fn to_header(&self) -> String {
        let json = serde_json::Value::Array(self.0.clone()).to_string();
        let mut header = String::with_capacity(json.len());
        for ch in json.chars() {
            if ch.is_ascii() && ch != '\u{7f}' {
                header.push(ch);
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units).iter() {
                    header.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
        header
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The engine's handle for a consistent, time-bounded walk over the collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorHandle {
    pub cursor_id: CursorId,
    pub continuation_key: Option<ContinuationKey>,
}

impl CursorHandle {
    /// A handle positioned at the start of the walk.
    pub fn fresh(cursor_id: CursorId) -> Self {
        Self {
            cursor_id,
            continuation_key: None,
        }
    }
}

/// Deterministic identity of a logical query.
///
/// The query text is trimmed, lower-cased and whitespace-collapsed; a missing or
/// blank type filter is scoped as `all`. Both parts are joined as a JSON array so
/// that no query text can collide with another (query, filter) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature(String);

impl QuerySignature {
    pub fn new(query: &str, type_filter: Option<&str>) -> Self {
        let query = normalize(query);
        let scope = type_filter
            .map(normalize)
            .filter(|scope| !scope.is_empty())
            .unwrap_or_else(|| "all".to_string());

        Self(serde_json::json!([query, scope]).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether something created at `created_at` is still inside `ttl` at `now`.
pub fn is_within_ttl(created_at: u64, now: u64, ttl: Duration) -> bool {
    now.saturating_sub(created_at) < ttl.as_millis() as u64
}
