//! Paged Fetch Loop
//!
//! Requests successive pages of one walk, attaching the mirrored cursor handle and
//! page hint after the first page, and accumulates items in order until the server
//! reports `hasMore = false`.
//!
//! A `reset` response only means the cursor was replaced: items already accumulated
//! stay, and the new page 1 is appended after them. At most one fetch per walk runs
//! at a time; a concurrent call returns [`FetchOutcome::InFlight`] without a request.

use super::mirror::CursorMirror;
use super::transport::{SearchTransport, TransportError};
use super::types::{FetchOutcome, MirrorEntry, RetryPolicy, SearchRequest};
use crate::cursor::types::{CursorHandle, QuerySignature, now_ms};
use crate::search::types::MediaItem;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct WalkState {
    query: String,
    type_filter: Option<String>,
    signature: QuerySignature,
    items: Vec<MediaItem>,
    /// Handle to continue from; `None` starts a new walk.
    next: Option<CursorHandle>,
    /// When the client first saw the cursor in `next` (ms since epoch).
    cursor_since: u64,
    next_page: u32,
    has_more: bool,
    total: u64,
}

impl WalkState {
    fn new(query: &str, type_filter: Option<&str>, resume: Option<MirrorEntry>) -> Self {
        let type_filter = type_filter
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let (next, cursor_since, next_page) = match resume {
            Some(entry) => (Some(entry.handle()), entry.timestamp, entry.page + 1),
            None => (None, 0, 1),
        };
        Self {
            query: query.trim().to_string(),
            signature: QuerySignature::new(query, type_filter.as_deref()),
            type_filter,
            items: Vec::new(),
            next,
            cursor_since,
            next_page,
            has_more: true,
            total: 0,
        }
    }

    fn request(&self, limit: usize) -> SearchRequest {
        let continuing = self.next.is_some();
        SearchRequest {
            query: self.query.clone(),
            type_filter: self.type_filter.clone(),
            page: self.next_page,
            limit,
            cursor_id: self.next.as_ref().map(|h| h.cursor_id.clone()),
            continuation_key: self.next.as_ref().and_then(|h| h.continuation_key.clone()),
            page_hint: continuing.then_some(self.next_page),
        }
    }
}

pub struct PagedFetchLoop {
    transport: Arc<dyn SearchTransport>,
    mirror: CursorMirror,
    limit: usize,
    state: Mutex<WalkState>,
}

impl PagedFetchLoop {
    /// Mounts a walk, resuming from the mirror when a live entry exists.
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        mirror: CursorMirror,
        query: &str,
        type_filter: Option<&str>,
        limit: usize,
    ) -> Self {
        let signature = QuerySignature::new(query, type_filter);
        let resume = mirror.switch(None, &signature);
        if let Some(entry) = &resume {
            tracing::info!("Resuming {} after page {} on {}", signature, entry.page, entry.cursor_id);
        }

        Self {
            transport,
            mirror,
            limit: limit.max(1),
            state: Mutex::new(WalkState::new(query, type_filter, resume)),
        }
    }

    pub fn mirror(&self) -> &CursorMirror {
        &self.mirror
    }

    /// Requests the next page of the walk.
    pub async fn fetch_next(&self) -> Result<FetchOutcome, TransportError> {
        let Ok(mut state) = self.state.try_lock() else {
            tracing::debug!("Fetch already in flight, skipping");
            return Ok(FetchOutcome::InFlight);
        };
        if !state.has_more {
            return Ok(FetchOutcome::Exhausted);
        }

        let now = now_ms();
        if state.next.is_some() && !self.mirror.is_live(state.cursor_since, now) {
            tracing::info!("Cursor for {} is past its reuse margin, starting over", state.signature);
            self.mirror.clear(&state.signature);
            state.next = None;
            state.next_page = 1;
        }

        let request = state.request(self.limit);
        let response = match self.transport.search(&request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_cursor_invalid() {
                    tracing::warn!("Cursor for {} rejected, clearing mirror: {}", state.signature, e);
                    self.mirror.clear(&state.signature);
                    state.next = None;
                    state.next_page = 1;
                }
                return Err(e);
            }
        };

        let reset = response.metadata.pit_reset.unwrap_or(false);
        let page = response.page;
        let handle = CursorHandle {
            cursor_id: response.metadata.pit_id,
            continuation_key: response.metadata.search_after,
        };

        if reset {
            tracing::info!("Server reset walk {} onto {}", state.signature, handle.cursor_id);
            self.mirror.save(&state.signature, &handle, page);
        } else if page <= 1 {
            self.mirror.save(&state.signature, &handle, page);
        } else {
            self.mirror.advance(&state.signature, &handle, page);
        }

        let same_cursor = state
            .next
            .as_ref()
            .is_some_and(|previous| previous.cursor_id == handle.cursor_id);
        if reset || !same_cursor {
            state.cursor_since = now;
        }

        let appended = response.items.len();
        state.items.extend(response.items);
        state.total = response.total;
        state.has_more = response.has_more;
        state.next = Some(handle);
        state.next_page = page.saturating_add(1);

        Ok(FetchOutcome::Fetched {
            page,
            appended,
            reset,
        })
    }

    /// [`fetch_next`](Self::fetch_next), retrying failed requests with backoff.
    ///
    /// `on_retry` sees each failure and the delay before the next attempt. A
    /// cursor-invalid failure has already cleared the walk's cursor, so its retry
    /// starts clean. The last error is returned once the policy is used up.
    pub async fn fetch_next_retrying<F>(
        &self,
        policy: &RetryPolicy,
        mut on_retry: F,
    ) -> Result<FetchOutcome, TransportError>
    where
        F: FnMut(&TransportError, usize, Duration),
    {
        let mut retry = 0;
        loop {
            match self.fetch_next().await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if retry < policy.max_retries => {
                    let delay = policy.delay(retry);
                    retry += 1;
                    tracing::warn!("Page request failed (retry {} in {:?}): {}", retry, delay, e);
                    on_retry(&e, retry, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches until the walk is exhausted or `max_pages` pages were served.
    /// Returns the number of pages fetched.
    pub async fn fetch_all(&self, max_pages: Option<usize>) -> Result<usize, TransportError> {
        let mut fetched = 0;
        while max_pages.is_none_or(|max| fetched < max) {
            match self.fetch_next().await? {
                FetchOutcome::Fetched { .. } => fetched += 1,
                FetchOutcome::Exhausted | FetchOutcome::InFlight => break,
            }
        }
        Ok(fetched)
    }

    /// Switches the walk to a new query. Waits for any in-flight fetch to finish.
    pub async fn switch_query(&self, query: &str, type_filter: Option<&str>) -> Option<MirrorEntry> {
        let mut state = self.state.lock().await;
        let signature = QuerySignature::new(query, type_filter);
        let resume = self.mirror.switch(Some(&state.signature), &signature);
        *state = WalkState::new(query, type_filter, resume.clone());
        resume
    }

    pub async fn items(&self) -> Vec<MediaItem> {
        self.state.lock().await.items.clone()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn total(&self) -> u64 {
        self.state.lock().await.total
    }

    pub async fn signature(&self) -> QuerySignature {
        self.state.lock().await.signature.clone()
    }

    /// The handle the next request would continue from.
    pub async fn continuation(&self) -> Option<CursorHandle> {
        self.state.lock().await.next.clone()
    }
}
