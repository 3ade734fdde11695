//! Search Client Module
//!
//! The consumer side of the pagination protocol: it walks a query page by page
//! against a media search node and keeps enough local state to resume the walk.
//!
//! ## Overview
//! A walk is identified by the same [`QuerySignature`](crate::cursor::types::QuerySignature)
//! the server uses. After every page the client mirrors the returned cursor handle
//! locally, TTL-bounded by the same margin as the server cache, so a restarted client
//! can continue where it stopped instead of starting a new cursor.
//!
//! ## Submodules
//! - **`store`**: pluggable persistence for mirror entries (memory, JSON file).
//! - **`mirror`**: load/save/advance/clear of the mirrored handle per signature.
//! - **`transport`**: the `SearchTransport` seam and its HTTP implementation.
//! - **`fetch`**: the Paged Fetch Loop with its in-flight guard.
//! - **`types`**: mirror entries, page requests and fetch outcomes.

pub mod fetch;
pub mod mirror;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;
