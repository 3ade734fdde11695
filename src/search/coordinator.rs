//! Pagination Coordinator
//!
//! Resolves which cursor a page request walks with, runs exactly one engine query
//! (plus at most one recovery retry), and packages the page with its continuation
//! metadata.
//!
//! ## Cursor resolution
//! 1. A caller-supplied cursor wins; the cache entry for the signature is refreshed to it.
//! 2. Otherwise a live cache entry for the signature is reused.
//! 3. Otherwise a new cursor is opened and cached, and the walk starts over at page 1.
//!
//! ## Recovery
//! If the engine reports the cursor invalid, the stale entry is deleted, a fresh cursor
//! is opened and the page is re-queried once from the start of the walk. The response
//! is flagged `reset` and numbered page 1. A second failure is returned as is.

use super::shaping::{has_more, narrow, narrowed_total};
use super::types::{PageRequest, PageResponse};
use crate::backend::types::{BackendPage, KeepAlive, PageQuery};
use crate::backend::{BackendError, SearchBackend};
use crate::cursor::cache::CursorCache;
use crate::cursor::types::{ContinuationKey, CursorHandle, CursorId, QuerySignature};

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The request itself cannot be served (bad header, bad keep-alive, ...).
    #[error("{0}")]
    MalformedInput(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Keep-alive requested for cursors opened by the coordinator.
    pub keep_alive: KeepAlive,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            keep_alive: KeepAlive::default(),
            default_limit: 50,
            max_limit: 500,
        }
    }
}

/// Where the cursor of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorSource {
    Caller,
    Cached,
    Fresh,
}

pub struct PaginationCoordinator {
    backend: Arc<dyn SearchBackend>,
    cache: Arc<CursorCache>,
    settings: CoordinatorSettings,
}

impl PaginationCoordinator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        cache: Arc<CursorCache>,
        settings: CoordinatorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            cache,
            settings,
        })
    }

    pub fn cache(&self) -> &Arc<CursorCache> {
        &self.cache
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Serves one page of a walk.
    pub async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse, SearchError> {
        let signature = QuerySignature::new(&request.query, request.type_filter.as_deref());
        let limit = request.limit.clamp(1, self.settings.max_limit.max(1));

        let (cursor_id, source) = self
            .resolve_cursor(&signature, request.cursor_id.clone())
            .await?;

        let continuation_key = match source {
            CursorSource::Fresh => {
                if request.continuation_key.is_some() {
                    tracing::debug!("Dropping continuation key for fresh walk {}", signature);
                }
                None
            }
            _ => request.continuation_key.clone().filter(|key| !key.is_empty()),
        };

        let page = if source == CursorSource::Fresh || continuation_key.is_none() {
            1
        } else {
            request
                .page_hint
                .unwrap_or(request.requested_page)
                .max(1)
        };

        match self
            .query(&cursor_id, limit, continuation_key.clone(), &request)
            .await
        {
            Ok(result) => {
                self.track_rotation(&signature, &cursor_id, &result.cursor_id);
                Ok(shape(result, limit, page, continuation_key, &request, false))
            }
            Err(BackendError::CursorInvalid(reason)) => {
                tracing::warn!(
                    "Cursor {} for {} is invalid ({}), recreating",
                    cursor_id,
                    signature,
                    reason
                );
                self.cache.delete(&signature);

                let fresh_id = self.open_and_cache(&signature).await?;
                let result = self.query(&fresh_id, limit, None, &request).await?;
                self.track_rotation(&signature, &fresh_id, &result.cursor_id);

                tracing::info!("Walk {} restarted on cursor {}", signature, result.cursor_id);
                Ok(shape(result, limit, 1, None, &request, true))
            }
            Err(e) => {
                tracing::error!("Page query for {} failed: {}", signature, e);
                Err(e.into())
            }
        }
    }

    /// Opens a cursor that is not tied to any cached walk.
    pub async fn open_cursor(&self, keep_alive: Option<KeepAlive>) -> Result<CursorId, SearchError> {
        let keep_alive = keep_alive.unwrap_or(self.settings.keep_alive);
        let cursor_id = self.backend.open_cursor(keep_alive).await?;
        tracing::info!("Opened cursor {} (keep_alive={})", cursor_id, keep_alive);
        Ok(cursor_id)
    }

    /// Closes a cursor and forgets every cached walk using it.
    pub async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), SearchError> {
        let evicted = self.cache.evict_cursor(cursor_id);
        self.backend.close_cursor(cursor_id).await?;
        tracing::info!("Closed cursor {} ({} cache entries evicted)", cursor_id, evicted);
        Ok(())
    }

    async fn resolve_cursor(
        &self,
        signature: &QuerySignature,
        caller_cursor: Option<CursorId>,
    ) -> Result<(CursorId, CursorSource), BackendError> {
        if let Some(cursor_id) = caller_cursor {
            tracing::debug!("Walk {} continues on caller cursor {}", signature, cursor_id);
            self.cache
                .put(signature.clone(), CursorHandle::fresh(cursor_id.clone()));
            return Ok((cursor_id, CursorSource::Caller));
        }

        if let Some(handle) = self.cache.get(signature) {
            tracing::debug!("Walk {} reuses cached cursor {}", signature, handle.cursor_id);
            return Ok((handle.cursor_id, CursorSource::Cached));
        }

        let cursor_id = self.open_and_cache(signature).await?;
        Ok((cursor_id, CursorSource::Fresh))
    }

    async fn open_and_cache(&self, signature: &QuerySignature) -> Result<CursorId, BackendError> {
        let cursor_id = self.backend.open_cursor(self.settings.keep_alive).await?;
        self.cache
            .put(signature.clone(), CursorHandle::fresh(cursor_id.clone()));
        tracing::info!("Opened cursor {} for walk {}", cursor_id, signature);
        Ok(cursor_id)
    }

    async fn query(
        &self,
        cursor_id: &CursorId,
        limit: usize,
        continuation_key: Option<ContinuationKey>,
        request: &PageRequest,
    ) -> Result<BackendPage, BackendError> {
        self.backend
            .query_page(PageQuery {
                cursor_id: cursor_id.clone(),
                limit,
                continuation_key,
                query: request.query.trim().to_string(),
                type_filter: request.type_filter.clone(),
            })
            .await
    }

    fn track_rotation(&self, signature: &QuerySignature, used: &CursorId, latest: &CursorId) {
        if used != latest && self.cache.rotate(signature, used, latest.clone()) {
            tracing::debug!("Engine rotated cursor {} -> {}", used, latest);
        }
    }
}

fn shape(
    result: BackendPage,
    limit: usize,
    page: u32,
    request_key: Option<ContinuationKey>,
    request: &PageRequest,
    reset: bool,
) -> PageResponse {
    let fetched = result.items.len();
    let more = has_more(fetched, limit, result.total);

    let items = narrow(result.items, request.type_filter.as_deref());
    let total = narrowed_total(result.total, fetched, items.len(), limit, page);
    if items.len() < fetched {
        tracing::debug!(
            "Narrowed page {} from {} to {} items (total {} -> {})",
            page,
            fetched,
            items.len(),
            result.total,
            total
        );
    }

    PageResponse {
        items,
        total,
        page,
        has_more: more,
        continuation: CursorHandle {
            cursor_id: result.cursor_id,
            continuation_key: result.continuation_key.or(request_key),
        },
        reset,
    }
}
