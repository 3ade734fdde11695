//! Media Search Library
//!
//! Keyword search over a large media collection with deep, stable pagination on top
//! of an engine's point-in-time cursors. The server binary (`main.rs`) and the
//! terminal client (`ui/src/main.rs`) are both built from these modules.
//!
//! ## Architecture Modules
//! - **`cursor`**: cursor handles, query signatures and the TTL-bounded cursor cache
//!   that lets stateless page requests share one engine cursor per logical query.
//! - **`backend`**: the `SearchBackend` capability, cursor-invalid classification, an
//!   in-memory point-in-time engine and the Elasticsearch adapter.
//! - **`search`**: the pagination coordinator, result shaping and the HTTP surface
//!   (`/media/search`, `/media/pit`).
//! - **`client`**: the client cursor mirror, its stores, the HTTP transport and the
//!   paged fetch loop.
//! - **`config`**: server flags and environment.

pub mod backend;
pub mod client;
pub mod config;
pub mod cursor;
pub mod search;
