//! Client Module Tests
//!
//! ## Test Scopes
//! - **Stores**: memory and on-disk persistence, corrupt and unavailable storage.
//! - **Mirror**: TTL margin, advance vs. save, signature switching.
//! - **Fetch loop**: full walks against an in-process coordinator, server resets,
//!   cursor-invalid failures and the in-flight guard.

#[cfg(test)]
mod tests {
    use crate::backend::{BackendError, SearchBackend};
    use crate::backend::testing::{FakeBackend, media_items};
    use crate::client::fetch::PagedFetchLoop;
    use crate::client::mirror::{CursorMirror, MIRROR_NAMESPACE};
    use crate::client::store::{FileStore, MemoryStore, MirrorStore, StoreError};
    use crate::client::transport::{SearchTransport, TransportError};
    use crate::client::types::{FetchOutcome, RetryPolicy, SearchRequest};
    use crate::cursor::cache::CursorCache;
    use crate::cursor::types::{
        CURSOR_TTL_MARGIN, ContinuationKey, CursorHandle, CursorId, QuerySignature,
    };
    use crate::search::coordinator::{CoordinatorSettings, PaginationCoordinator, SearchError};
    use crate::search::protocol::SearchResponse;
    use crate::search::types::PageRequest;

    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    /// Serves requests from a coordinator in the same process.
    struct CoordinatorTransport {
        coordinator: Arc<PaginationCoordinator>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        requests: std::sync::Mutex<Vec<SearchRequest>>,
    }

    impl CoordinatorTransport {
        fn new(coordinator: Arc<PaginationCoordinator>) -> Self {
            Self {
                coordinator,
                delay: None,
                calls: AtomicUsize::new(0),
                requests: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn slow(coordinator: Arc<PaginationCoordinator>, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(coordinator)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> Option<SearchRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl SearchTransport for CoordinatorTransport {
        async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let page = self
                .coordinator
                .fetch_page(PageRequest {
                    query: request.query.clone(),
                    type_filter: request.type_filter.clone(),
                    requested_page: request.page,
                    limit: request.limit,
                    cursor_id: request.cursor_id.clone(),
                    continuation_key: request.continuation_key.clone(),
                    page_hint: request.page_hint,
                })
                .await
                .map_err(|e| TransportError::Status {
                    status: match e {
                        SearchError::MalformedInput(_) => 400,
                        SearchError::Backend(_) => 500,
                    },
                    message: format!("Search failed: {}", e),
                })?;
            Ok(SearchResponse::from(page))
        }
    }

    /// Storage that is never available.
    struct BrokenStore;

    impl MirrorStore for BrokenStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        fn write(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".to_string()))
        }
    }

    fn setup(count: usize) -> (Arc<FakeBackend>, Arc<CoordinatorTransport>) {
        let backend = Arc::new(FakeBackend::new(media_items(count, "st")));
        let coordinator = PaginationCoordinator::new(
            backend.clone(),
            CursorCache::new(CURSOR_TTL_MARGIN),
            CoordinatorSettings::default(),
        );
        (backend, Arc::new(CoordinatorTransport::new(coordinator)))
    }

    fn memory_mirror() -> (Arc<MemoryStore>, CursorMirror) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), CursorMirror::with_default_ttl(store))
    }

    fn handle(id: &str, key: Option<&str>) -> CursorHandle {
        CursorHandle {
            cursor_id: CursorId::from(id),
            continuation_key: key.map(|k| ContinuationKey(vec![serde_json::json!(k)])),
        }
    }

    // ============================================================
    // STORES
    // ============================================================

    #[test]
    fn test_memory_store_read_write_remove() {
        let store = MemoryStore::new();

        store.write("a", "1".to_string()).unwrap();
        assert_eq!(store.read("a").unwrap(), Some("1".to_string()));

        store.remove("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("mirror.json");

        let store = FileStore::new(&path);
        store.write("k1", "v1".to_string()).unwrap();
        store.write("k2", "v2".to_string()).unwrap();
        store.remove("k1").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.read("k1").unwrap(), None);
        assert_eq!(reopened.read("k2").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));

        assert_eq!(store.read("anything").unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_file_reads_as_error_and_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(store.read("k"), Err(StoreError::Corrupt(_))));

        store.write("k", "v".to_string()).unwrap();
        assert_eq!(store.read("k").unwrap(), Some("v".to_string()));
    }

    // ============================================================
    // MIRROR
    // ============================================================

    #[test]
    fn test_mirror_entries_are_namespaced() {
        let (store, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);

        mirror.save_at(&sig, &handle("c1", None), 1, T0);

        let key = format!("{}{}", MIRROR_NAMESPACE, sig);
        let raw = store.read(&key).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["cursorId"], "c1");
        assert_eq!(json["timestamp"], T0);
        assert_eq!(json["page"], 1);
    }

    #[test]
    fn test_mirror_ttl_margin() {
        let (_, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        mirror.save_at(&sig, &handle("c1", Some("k1")), 1, T0);

        let fresh = mirror.load_at(&sig, T0 + 239_000).unwrap();
        assert_eq!(fresh.handle(), handle("c1", Some("k1")));

        assert!(mirror.load_at(&sig, T0 + 241_000).is_none());
        assert!(mirror.load_at(&sig, T0).is_none(), "expired entry was dropped");
    }

    #[test]
    fn test_mirror_advance_keeps_timestamp_for_same_cursor() {
        let (_, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        mirror.save_at(&sig, &handle("c1", Some("k1")), 1, T0);

        mirror.advance_at(&sig, &handle("c1", Some("k2")), 2, T0 + 60_000);

        let entry = mirror.load_at(&sig, T0 + 60_000).unwrap();
        assert_eq!(entry.timestamp, T0);
        assert_eq!(entry.page, 2);
        assert_eq!(entry.handle(), handle("c1", Some("k2")));
    }

    #[test]
    fn test_mirror_advance_restarts_clock_for_new_cursor() {
        let (_, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        mirror.save_at(&sig, &handle("c1", Some("k1")), 1, T0);

        mirror.advance_at(&sig, &handle("c2", Some("k2")), 2, T0 + 60_000);

        assert_eq!(mirror.load_at(&sig, T0 + 60_000).unwrap().timestamp, T0 + 60_000);
    }

    #[test]
    fn test_mirror_advance_past_margin_keeps_original_timestamp() {
        let (_, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        mirror.save_at(&sig, &handle("c1", Some("k1")), 1, T0);

        mirror.advance_at(&sig, &handle("c1", Some("k2")), 2, T0 + 250_000);

        // Still dated by when c1 was first seen, so a restarted client does not resume on it
        assert!(mirror.load_at(&sig, T0 + 250_000).is_none());
    }

    #[test]
    fn test_mirror_advance_on_expired_entry_stores_original_timestamp() {
        let (store, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        mirror.save_at(&sig, &handle("c1", Some("k1")), 1, T0);

        mirror.advance_at(&sig, &handle("c1", Some("k2")), 2, T0 + 250_000);

        let raw = store.read(&format!("{}{}", MIRROR_NAMESPACE, sig)).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["timestamp"], T0);
        assert_eq!(json["page"], 2);
    }

    #[test]
    fn test_mirror_switch_clears_previous_signature() {
        let (_, mirror) = memory_mirror();
        let a = QuerySignature::new("berlin", None);
        let b = QuerySignature::new("hamburg", Some("sp"));
        mirror.save(&a, &handle("ca", None), 1);
        mirror.save(&b, &handle("cb", None), 1);

        let loaded = mirror.switch(Some(&a), &b);

        assert_eq!(loaded.map(|e| e.cursor_id), Some(CursorId::from("cb")));
        assert!(mirror.load(&a).is_none());
    }

    #[test]
    fn test_mirror_switch_to_same_signature_keeps_entry() {
        let (_, mirror) = memory_mirror();
        let a = QuerySignature::new("berlin", None);
        mirror.save(&a, &handle("ca", None), 1);

        assert!(mirror.switch(Some(&a), &a).is_some());
    }

    #[test]
    fn test_mirror_unreadable_entry_is_a_miss() {
        let (store, mirror) = memory_mirror();
        let sig = QuerySignature::new("berlin", None);
        store
            .write(&format!("{}{}", MIRROR_NAMESPACE, sig), "garbage".to_string())
            .unwrap();

        assert!(mirror.load(&sig).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_mirror_over_broken_store_degrades_to_miss() {
        let mirror = CursorMirror::with_default_ttl(Arc::new(BrokenStore));
        let sig = QuerySignature::new("berlin", None);

        mirror.save(&sig, &handle("c1", None), 1);
        mirror.clear(&sig);

        assert!(mirror.load(&sig).is_none());
    }

    // ============================================================
    // FETCH LOOP
    // ============================================================

    #[tokio::test]
    async fn test_walk_accumulates_until_exhausted() {
        let (_, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);

        let pages = walker.fetch_all(None).await.unwrap();

        assert_eq!(pages, 3);
        assert_eq!(walker.items().await.len(), 120);
        assert_eq!(walker.total().await, 120);
        assert!(!walker.has_more().await);
        assert_eq!(walker.fetch_next().await.unwrap(), FetchOutcome::Exhausted);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_requests_after_first_carry_cursor_and_hint() {
        let (_, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);

        walker.fetch_next().await.unwrap();
        let first = transport.last_request().unwrap();
        assert!(first.cursor_id.is_none());
        assert!(first.page_hint.is_none());

        walker.fetch_next().await.unwrap();
        let second = transport.last_request().unwrap();
        assert!(second.cursor_id.is_some());
        assert!(second.continuation_key.is_some());
        assert_eq!(second.page, 2);
        assert_eq!(second.page_hint, Some(2));
    }

    #[tokio::test]
    async fn test_max_pages_bounds_the_walk() {
        let (_, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport, mirror, "", None, 10);

        assert_eq!(walker.fetch_all(Some(2)).await.unwrap(), 2);
        assert_eq!(walker.items().await.len(), 20);
        assert!(walker.has_more().await);
    }

    #[tokio::test]
    async fn test_server_reset_overwrites_mirror_and_keeps_items() {
        let (backend, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport, mirror, "berlin", None, 50);
        let sig = QuerySignature::new("berlin", None);

        // Page 1 on C1
        assert_eq!(
            walker.fetch_next().await.unwrap(),
            FetchOutcome::Fetched { page: 1, appended: 50, reset: false }
        );
        let c1 = walker.mirror().load(&sig).unwrap().cursor_id;

        // C1 expires on the engine
        backend.inner.close_cursor(&c1).await.unwrap();

        assert_eq!(
            walker.fetch_next().await.unwrap(),
            FetchOutcome::Fetched { page: 1, appended: 50, reset: true }
        );
        let mirrored = walker.mirror().load(&sig).unwrap();
        assert_ne!(mirrored.cursor_id, c1);
        assert_eq!(mirrored.page, 1);
        assert_eq!(walker.items().await.len(), 100);

        // Walk continues on C2 from its page 2
        assert_eq!(
            walker.fetch_next().await.unwrap(),
            FetchOutcome::Fetched { page: 2, appended: 50, reset: false }
        );
        assert_eq!(walker.mirror().load(&sig).unwrap().cursor_id, mirrored.cursor_id);
        assert_eq!(walker.fetch_all(None).await.unwrap(), 1);
        assert_eq!(walker.items().await.len(), 170);
    }

    #[tokio::test]
    async fn test_cursor_invalid_error_clears_mirror() {
        let (backend, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);
        let sig = QuerySignature::new("berlin", None);
        walker.fetch_next().await.unwrap();

        backend.fail_next_queries(vec![
            BackendError::CursorInvalid("PIT not found".to_string()),
            BackendError::CursorInvalid("PIT not found".to_string()),
        ]);
        let err = walker.fetch_next().await.unwrap_err();

        assert!(err.is_cursor_invalid());
        assert!(walker.mirror().load(&sig).is_none());
        assert!(walker.continuation().await.is_none());

        // Next request starts clean
        walker.fetch_next().await.unwrap();
        let request = transport.last_request().unwrap();
        assert!(request.cursor_id.is_none());
        assert_eq!(request.page, 1);
    }

    #[tokio::test]
    async fn test_other_errors_keep_mirror() {
        let (backend, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport, mirror, "berlin", None, 50);
        let sig = QuerySignature::new("berlin", None);
        walker.fetch_next().await.unwrap();

        backend.fail_next_queries(vec![BackendError::Unavailable("timeout".to_string())]);
        let err = walker.fetch_next().await.unwrap_err();

        assert!(!err.is_cursor_invalid());
        assert!(walker.mirror().load(&sig).is_some());
        assert!(walker.has_more().await);
    }

    #[tokio::test]
    async fn test_second_fetch_while_in_flight_is_rejected() {
        let (_, base) = setup(120);
        let transport = Arc::new(CoordinatorTransport::slow(
            base.coordinator.clone(),
            Duration::from_millis(50),
        ));
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);

        let (a, b) = tokio::join!(walker.fetch_next(), walker.fetch_next());

        assert!(matches!(a.unwrap(), FetchOutcome::Fetched { page: 1, .. }));
        assert_eq!(b.unwrap(), FetchOutcome::InFlight);
        assert_eq!(transport.calls(), 1);
        assert_eq!(walker.items().await.len(), 50);
    }

    #[tokio::test]
    async fn test_new_loop_resumes_from_mirror() {
        let (_, transport) = setup(120);
        let store = Arc::new(MemoryStore::new());

        let first = PagedFetchLoop::new(
            transport.clone(),
            CursorMirror::with_default_ttl(store.clone()),
            "berlin",
            None,
            50,
        );
        first.fetch_next().await.unwrap();
        let page_one = first.items().await;

        // A restarted client picks up at page 2
        let second = PagedFetchLoop::new(
            transport.clone(),
            CursorMirror::with_default_ttl(store),
            "berlin",
            None,
            50,
        );
        assert_eq!(
            second.fetch_next().await.unwrap(),
            FetchOutcome::Fetched { page: 2, appended: 50, reset: false }
        );
        let page_two = second.items().await;
        assert!(page_two.iter().all(|item| !page_one.contains(item)));
    }

    #[tokio::test]
    async fn test_switch_query_clears_items_and_previous_mirror() {
        let (_, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport, mirror, "berlin", None, 50);
        walker.fetch_next().await.unwrap();
        let old = QuerySignature::new("berlin", None);

        let resumed = walker.switch_query("street", Some("st")).await;

        assert!(resumed.is_none());
        assert!(walker.items().await.is_empty());
        assert!(walker.mirror().load(&old).is_none());
        assert_eq!(walker.signature().await, QuerySignature::new("street", Some("st")));

        walker.fetch_next().await.unwrap();
        assert_eq!(walker.items().await.len(), 50);
    }

    #[tokio::test]
    async fn test_expired_handle_is_not_reused_by_running_walk() {
        let (_, transport) = setup(120);
        let mirror = CursorMirror::new(Arc::new(MemoryStore::new()), Duration::from_millis(100));
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);
        let sig = QuerySignature::new("berlin", None);
        walker.fetch_next().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let outcome = walker.fetch_next().await.unwrap();

        let request = transport.last_request().unwrap();
        assert!(request.cursor_id.is_none());
        assert!(request.continuation_key.is_none());
        assert_eq!(request.page, 1);
        assert!(matches!(outcome, FetchOutcome::Fetched { page: 1, .. }));
        assert_eq!(walker.items().await.len(), 100);
        assert!(walker.mirror().load(&sig).is_some(), "fresh walk is mirrored again");
    }

    fn quick_retries(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_retried_and_reported() {
        let (backend, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);
        walker.fetch_next().await.unwrap();
        backend.fail_next_queries(vec![BackendError::Unavailable("engine down".to_string())]);

        let mut reported = Vec::new();
        let outcome = walker
            .fetch_next_retrying(&quick_retries(2), |e, retry, _| {
                reported.push((retry, e.to_string()))
            })
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Fetched { page: 2, appended: 50, reset: false });
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, 1);
        assert!(reported[0].1.contains("engine down"));
        assert_eq!(walker.items().await.len(), 100);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error_and_keeps_walk() {
        let (backend, transport) = setup(120);
        let (_, mirror) = memory_mirror();
        let walker = PagedFetchLoop::new(transport.clone(), mirror, "berlin", None, 50);
        walker.fetch_next().await.unwrap();
        backend.fail_next_queries(vec![
            BackendError::Unavailable("engine down".to_string()),
            BackendError::Unavailable("engine down".to_string()),
            BackendError::Unavailable("engine down".to_string()),
        ]);

        let mut retries = 0;
        let err = walker
            .fetch_next_retrying(&quick_retries(2), |_, _, _| retries += 1)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("engine down"));
        assert_eq!(retries, 2);
        assert_eq!(transport.calls(), 4);
        assert!(walker.has_more().await);
        assert!(walker.continuation().await.is_some(), "walk can resume later");
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };

        assert!(policy.delay(0) >= Duration::from_millis(100));
        assert!(policy.delay(0) < Duration::from_millis(110));
        assert!(policy.delay(1) >= Duration::from_millis(200));
        assert!(policy.delay(4) >= Duration::from_millis(300));
        assert!(policy.delay(4) < Duration::from_millis(330));
    }

    #[tokio::test]
    async fn test_walk_without_storage_still_completes() {
        let (_, transport) = setup(70);
        let mirror = CursorMirror::with_default_ttl(Arc::new(BrokenStore));
        let walker = PagedFetchLoop::new(transport, mirror, "berlin", None, 50);

        assert_eq!(walker.fetch_all(None).await.unwrap(), 2);
        assert_eq!(walker.items().await.len(), 70);
    }

    #[tokio::test]
    async fn test_on_disk_mirror_walk() {
        let dir = tempfile::tempdir().unwrap();
        let (_, transport) = setup(60);
        let store = Arc::new(FileStore::new(dir.path().join("mirror.json")));
        let walker = PagedFetchLoop::new(
            transport,
            CursorMirror::with_default_ttl(store.clone()),
            "berlin",
            None,
            25,
        );

        walker.fetch_all(Some(2)).await.unwrap();

        let reloaded = CursorMirror::with_default_ttl(Arc::new(FileStore::new(store.path())));
        let entry = reloaded.load(&QuerySignature::new("berlin", None)).unwrap();
        assert_eq!(entry.page, 2);
        assert!(entry.continuation_key.is_some());
    }
}
