//! Client Cursor Mirror
//!
//! A local, TTL-bounded copy of the cursor handle for each walk, keyed by query
//! signature under [`MIRROR_NAMESPACE`]. The mirror never fails a page fetch: any
//! store or decode failure is logged and treated as a miss.

use super::store::MirrorStore;
use super::types::MirrorEntry;
use crate::cursor::types::{CURSOR_TTL_MARGIN, CursorHandle, QuerySignature, is_within_ttl, now_ms};

use std::sync::Arc;
use std::time::Duration;

pub const MIRROR_NAMESPACE: &str = "media-search:pit:";

pub struct CursorMirror {
    store: Arc<dyn MirrorStore>,
    ttl: Duration,
}

impl CursorMirror {
    pub fn new(store: Arc<dyn MirrorStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// A mirror expiring on the same margin as the server cache.
    pub fn with_default_ttl(store: Arc<dyn MirrorStore>) -> Self {
        Self::new(store, CURSOR_TTL_MARGIN)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether a cursor first mirrored at `timestamp` may still be used at `now`.
    pub fn is_live(&self, timestamp: u64, now: u64) -> bool {
        is_within_ttl(timestamp, now, self.ttl)
    }

    pub fn load(&self, signature: &QuerySignature) -> Option<MirrorEntry> {
        self.load_at(signature, now_ms())
    }

    pub fn load_at(&self, signature: &QuerySignature, now: u64) -> Option<MirrorEntry> {
        let entry = self.read(signature)?;
        if self.is_live(entry.timestamp, now) {
            Some(entry)
        } else {
            tracing::debug!("Mirror for {} expired", signature);
            self.clear(signature);
            None
        }
    }

    /// Overwrites the mirror with `handle`, starting a new TTL window.
    pub fn save(&self, signature: &QuerySignature, handle: &CursorHandle, page: u32) {
        self.save_at(signature, handle, page, now_ms());
    }

    pub fn save_at(&self, signature: &QuerySignature, handle: &CursorHandle, page: u32, now: u64) {
        self.write(
            signature,
            MirrorEntry {
                cursor_id: handle.cursor_id.clone(),
                continuation_key: handle.continuation_key.clone(),
                timestamp: now,
                page,
            },
        );
    }

    /// Moves the mirror forward within the same walk.
    ///
    /// The timestamp is kept while the cursor id is unchanged, so the mirror expires
    /// relative to when the cursor was first seen.
    pub fn advance(&self, signature: &QuerySignature, handle: &CursorHandle, page: u32) {
        self.advance_at(signature, handle, page, now_ms());
    }

    pub fn advance_at(
        &self,
        signature: &QuerySignature,
        handle: &CursorHandle,
        page: u32,
        now: u64,
    ) {
        // Raw read: an expired entry still dates the cursor it belongs to.
        let timestamp = self
            .read(signature)
            .filter(|entry| entry.cursor_id == handle.cursor_id)
            .map(|entry| entry.timestamp)
            .unwrap_or(now);
        self.save_at(signature, handle, page, timestamp);
    }

    pub fn clear(&self, signature: &QuerySignature) {
        if let Err(e) = self.store.remove(&key(signature)) {
            tracing::warn!("Could not clear mirror for {}: {}", signature, e);
        }
    }

    /// Mount or signature change: drops the abandoned walk and loads the new one.
    pub fn switch(
        &self,
        previous: Option<&QuerySignature>,
        next: &QuerySignature,
    ) -> Option<MirrorEntry> {
        if let Some(previous) = previous.filter(|p| *p != next) {
            tracing::debug!("Abandoning walk {}", previous);
            self.clear(previous);
        }
        self.load(next)
    }

    fn read(&self, signature: &QuerySignature) -> Option<MirrorEntry> {
        let raw = match self.store.read(&key(signature)) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Mirror read for {} failed, continuing without: {}", signature, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Dropping unreadable mirror for {}: {}", signature, e);
                self.clear(signature);
                None
            }
        }
    }

    fn write(&self, signature: &QuerySignature, entry: MirrorEntry) {
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Could not encode mirror for {}: {}", signature, e);
                return;
            }
        };
        if let Err(e) = self.store.write(&key(signature), raw) {
            tracing::warn!("Mirror write for {} failed, continuing without: {}", signature, e);
        }
    }
}

fn key(signature: &QuerySignature) -> String {
    format!("{}{}", MIRROR_NAMESPACE, signature)
}
