//! Test doubles for the search backend.

use super::memory::MemoryBackend;
use super::types::{BackendPage, KeepAlive, PageQuery};
use super::{BackendError, SearchBackend};
use crate::cursor::types::CursorId;
use crate::search::types::MediaItem;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Generates `count` media records of type `db` with distinct ids and sort keys.
pub(crate) fn media_items(count: usize, db: &str) -> Vec<MediaItem> {
    (0..count)
        .map(|i| MediaItem {
            id: format!("{}-{}", db, i),
            bildnummer: format!("{}{:07}", if db == "st" { 1 } else { 2 }, i),
            datum: Some(format!("2023-{:02}-{:02}", 1 + i % 12, 1 + i % 28)),
            suchtext: Some(format!("Berlin street scene number {}", i)),
            fotografen: Some("Test Photographer".to_string()),
            hoehe: Some("1080".to_string()),
            breite: Some("1920".to_string()),
            db: Some(db.to_string()),
        })
        .collect()
}

/// A [`MemoryBackend`] that counts calls and can be scripted to fail.
pub(crate) struct FakeBackend {
    pub inner: MemoryBackend,
    opened: AtomicUsize,
    queries: AtomicUsize,
    closed: AtomicUsize,
    failures: Mutex<VecDeque<BackendError>>,
    rotate_to: Mutex<Option<CursorId>>,
    loose_types: AtomicBool,
    queried_with: Mutex<Vec<PageQuery>>,
}

impl FakeBackend {
    pub fn new(documents: Vec<MediaItem>) -> Self {
        Self {
            inner: MemoryBackend::with_documents(documents),
            opened: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            rotate_to: Mutex::new(None),
            loose_types: AtomicBool::new(false),
            queried_with: Mutex::new(Vec::new()),
        }
    }

    /// The next `query_page` calls fail with these errors, in order.
    pub fn fail_next_queries(&self, errors: Vec<BackendError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// The next successful query reports `cursor_id` as the latest id.
    pub fn rotate_next(&self, cursor_id: CursorId) {
        *self.rotate_to.lock().unwrap() = Some(cursor_id);
    }

    /// Ignore the type filter, as an engine with a loosely analyzed type field would.
    pub fn loose_type_matching(&self) {
        self.loose_types.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<PageQuery> {
        self.queried_with.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn check_connection(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn open_cursor(&self, keep_alive: KeepAlive) -> Result<CursorId, BackendError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open_cursor(keep_alive).await
    }

    async fn query_page(&self, query: PageQuery) -> Result<BackendPage, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.queried_with.lock().unwrap().push(query.clone());

        let scripted = self.failures.lock().unwrap().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        let mut query = query;
        if self.loose_types.load(Ordering::SeqCst) {
            query.type_filter = None;
        }
        let mut page = self.inner.query_page(query).await?;
        if let Some(rotated) = self.rotate_to.lock().unwrap().take() {
            page.cursor_id = rotated;
        }
        Ok(page)
    }

    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), BackendError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close_cursor(cursor_id).await
    }
}
