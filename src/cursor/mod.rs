//! Cursor Module
//!
//! Server-side bookkeeping for point-in-time (PIT) cursors issued by the search engine.
//!
//! ## Core Concepts
//! - **Cursor Handle**: the engine's opaque cursor id plus the continuation key
//!   (sort values of the last record returned) used to resume a walk.
//! - **Query Signature**: normalized identity of a logical query. Two requests with the
//!   same signature belong to the same walk and share one cursor.
//! - **Cursor Cache**: signature -> handle map with a creation timestamp. Entries are
//!   reported stale once the safety margin (4 minutes) elapses, strictly before the
//!   engine's own keep-alive (5 minutes) would expire the cursor.
//!
//! The cache never talks to the engine; callers decide when to recreate.

pub mod cache;
pub mod types;
