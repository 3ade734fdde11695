//! Cursor Cache
//!
//! In-memory map from [`QuerySignature`] to the live cursor of that walk.
//!
//! `DashMap` locks the shard owning a signature for the duration of each operation, so
//! a `put` or `delete` is atomic with respect to a concurrent `get` of the same
//! signature. Concurrent creators of the same signature resolve as last-writer-wins.
//! No lock is held while the engine is being called.

use super::types::{CursorHandle, CursorId, QuerySignature, is_within_ttl, now_ms};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// A cached handle together with the time it was established.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub handle: CursorHandle,
    /// Timestamp (ms) when the cursor was stored. Reuse never moves it.
    pub created_at: u64,
}

pub struct CursorCache {
    entries: DashMap<QuerySignature, CacheEntry>,
    ttl: Duration,
}

impl CursorCache {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached handle if it is younger than the TTL margin.
    ///
    /// Stale entries are reported absent but left in place; removal is up to the caller.
    pub fn get(&self, signature: &QuerySignature) -> Option<CursorHandle> {
        self.get_at(signature, now_ms())
    }

    pub fn get_at(&self, signature: &QuerySignature, now: u64) -> Option<CursorHandle> {
        let entry = self.entries.get(signature)?;
        if is_within_ttl(entry.created_at, now, self.ttl) {
            Some(entry.handle.clone())
        } else {
            tracing::debug!(
                "Cursor {} for {} is past its margin",
                entry.handle.cursor_id,
                signature
            );
            None
        }
    }

    /// Unconditionally replaces the entry for `signature`, stamping it with the current time.
    pub fn put(&self, signature: QuerySignature, handle: CursorHandle) {
        self.put_at(signature, handle, now_ms());
    }

    pub fn put_at(&self, signature: QuerySignature, handle: CursorHandle, now: u64) {
        self.entries.insert(
            signature,
            CacheEntry {
                handle,
                created_at: now,
            },
        );
    }

    /// Removes the entry for `signature`, returning it if one existed.
    pub fn delete(&self, signature: &QuerySignature) -> Option<CacheEntry> {
        self.entries.remove(signature).map(|(_, entry)| entry)
    }

    /// Swaps the cursor id of an entry after the engine rotated it.
    ///
    /// Only applies while the entry still holds `from`; the creation time is kept.
    pub fn rotate(&self, signature: &QuerySignature, from: &CursorId, to: CursorId) -> bool {
        match self.entries.get_mut(signature) {
            Some(mut entry) if entry.handle.cursor_id == *from => {
                let created_at = entry.created_at;
                let continuation_key = entry.handle.continuation_key.clone();
                *entry = CacheEntry {
                    handle: CursorHandle {
                        cursor_id: to,
                        continuation_key,
                    },
                    created_at,
                };
                true
            }
            _ => false,
        }
    }

    /// Drops every entry pointing at `cursor_id`. Returns how many were removed.
    pub fn evict_cursor(&self, cursor_id: &CursorId) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.handle.cursor_id != *cursor_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Drops entries past the TTL margin. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_ms())
    }

    pub fn purge_expired_at(&self, now: u64) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = is_within_ttl(entry.created_at, now, self.ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
