//! In-Memory Point-in-Time Engine
//!
//! A working engine over a document set held in process, with the same cursor
//! semantics as the production engine:
//! - `open_cursor` freezes a sorted snapshot of the collection; later writes are not
//!   visible through it.
//! - Each query renews the cursor's keep-alive. Querying an expired, closed or unknown
//!   cursor fails with "No search context found".
//! - Records are ordered by `datum` descending, then `bildnummer` ascending; the
//!   continuation key is `[datum, bildnummer]` of the last record of a page.

use super::types::{BackendPage, KeepAlive, PageQuery};
use super::{BackendError, SearchBackend};
use crate::cursor::types::{ContinuationKey, CursorId, now_ms};
use crate::search::tokenizer::{tokenize_query, tokenize_text};
use crate::search::types::MediaItem;

use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

struct SearchContext {
    snapshot: Arc<Vec<MediaItem>>,
    keep_alive_ms: u64,
    expires_at: u64,
}

pub struct MemoryBackend {
    documents: RwLock<Vec<MediaItem>>,
    contexts: DashMap<CursorId, SearchContext>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_documents(Vec::new())
    }

    pub fn with_documents(documents: Vec<MediaItem>) -> Self {
        let documents = documents.into_iter().map(with_id).collect();
        Self {
            documents: RwLock::new(documents),
            contexts: DashMap::new(),
        }
    }

    /// Adds a document. Cursors opened earlier do not see it.
    pub async fn index(&self, item: MediaItem) {
        self.documents.write().await.push(with_id(item));
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub fn open_cursor_count(&self) -> usize {
        self.contexts.len()
    }

    fn missing_context(cursor_id: &CursorId) -> BackendError {
        BackendError::CursorInvalid(format!(
            "search_context_missing_exception: No search context found for id [{}]",
            cursor_id
        ))
    }

    /// Renews the context's keep-alive and hands out its snapshot.
    fn touch(&self, cursor_id: &CursorId, now: u64) -> Result<Arc<Vec<MediaItem>>, BackendError> {
        let expired = match self.contexts.get_mut(cursor_id) {
            Some(mut context) if context.expires_at > now => {
                context.expires_at = now + context.keep_alive_ms;
                return Ok(Arc::clone(&context.snapshot));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            tracing::debug!("Search context {} expired", cursor_id);
            self.contexts.remove(cursor_id);
        }
        Err(Self::missing_context(cursor_id))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn check_connection(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn open_cursor(&self, keep_alive: KeepAlive) -> Result<CursorId, BackendError> {
        let mut snapshot = self.documents.read().await.clone();
        snapshot.sort_by(sort_order);

        let cursor_id = CursorId(uuid::Uuid::new_v4().to_string());
        let keep_alive_ms = keep_alive.as_millis();
        self.contexts.insert(
            cursor_id.clone(),
            SearchContext {
                snapshot: Arc::new(snapshot),
                keep_alive_ms,
                expires_at: now_ms() + keep_alive_ms,
            },
        );

        tracing::debug!("Opened search context {} (keep_alive={})", cursor_id, keep_alive);
        Ok(cursor_id)
    }

    async fn query_page(&self, query: PageQuery) -> Result<BackendPage, BackendError> {
        let snapshot = self.touch(&query.cursor_id, now_ms())?;

        let terms = tokenize_query(&query.query);
        let type_filter = query.type_filter.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let matches: Vec<&MediaItem> = snapshot
            .iter()
            .filter(|item| matches_terms(item, &terms) && matches_type(item, type_filter))
            .collect();

        let start = match &query.continuation_key {
            Some(key) => {
                let (datum, bildnummer) = decode_key(key)?;
                matches
                    .iter()
                    .position(|item| {
                        compare_to_key(item, datum.as_deref(), &bildnummer) == Ordering::Greater
                    })
                    .unwrap_or(matches.len())
            }
            None => 0,
        };

        let items: Vec<MediaItem> = matches[start..]
            .iter()
            .take(query.limit)
            .map(|item| (*item).clone())
            .collect();
        let continuation_key = items.last().map(encode_key);

        Ok(BackendPage {
            items,
            total: matches.len() as u64,
            continuation_key,
            cursor_id: query.cursor_id,
        })
    }

    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), BackendError> {
        if self.contexts.remove(cursor_id).is_none() {
            tracing::debug!("Close of unknown search context {}", cursor_id);
        }
        Ok(())
    }
}

fn with_id(mut item: MediaItem) -> MediaItem {
    if item.id.is_empty() {
        item.id = uuid::Uuid::new_v4().to_string();
    }
    item
}

fn sort_order(a: &MediaItem, b: &MediaItem) -> Ordering {
    b.datum
        .cmp(&a.datum)
        .then_with(|| a.bildnummer.cmp(&b.bildnummer))
}

/// `Greater` when `item` sorts after the record the key was taken from.
fn compare_to_key(item: &MediaItem, datum: Option<&str>, bildnummer: &str) -> Ordering {
    datum
        .cmp(&item.datum.as_deref())
        .then_with(|| item.bildnummer.as_str().cmp(bildnummer))
}

fn encode_key(item: &MediaItem) -> ContinuationKey {
    ContinuationKey(vec![
        item.datum
            .as_ref()
            .map(|d| serde_json::Value::String(d.clone()))
            .unwrap_or(serde_json::Value::Null),
        serde_json::Value::String(item.bildnummer.clone()),
    ])
}

fn decode_key(key: &ContinuationKey) -> Result<(Option<String>, String), BackendError> {
    let rejected = || {
        BackendError::Rejected(format!(
            "search_after {} does not match the sort [datum, bildnummer]",
            key.to_header()
        ))
    };

    match key.0.as_slice() {
        [datum, serde_json::Value::String(bildnummer)] => {
            let datum = match datum {
                serde_json::Value::Null => None,
                serde_json::Value::String(d) => Some(d.clone()),
                _ => return Err(rejected()),
            };
            Ok((datum, bildnummer.clone()))
        }
        _ => Err(rejected()),
    }
}

fn matches_terms(item: &MediaItem, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }

    let mut text = String::new();
    for field in [&item.suchtext, &item.fotografen].into_iter().flatten() {
        text.push_str(field);
        text.push(' ');
    }
    text.push_str(&item.bildnummer);

    let tokens = tokenize_text(&text);
    terms.iter().any(|term| tokens.contains(term))
}

fn matches_type(item: &MediaItem, type_filter: Option<&str>) -> bool {
    match type_filter {
        Some(filter) => item
            .db
            .as_deref()
            .is_some_and(|db| db.eq_ignore_ascii_case(filter)),
        None => true,
    }
}
