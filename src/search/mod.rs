//! Search Service Module
//!
//! Serves keyword search over the media collection as a deep, stable page walk.
//!
//! ## Overview
//! Every page request is stateless on the wire: the caller echoes back the cursor id,
//! continuation key and page number it received. The coordinator keeps one live engine
//! cursor per logical query so callers that lose that state still land on the same
//! point-in-time view while it lasts.
//!
//! ## Submodules
//! - **`coordinator`**: cursor resolution, the single recovery retry, response packaging.
//! - **`shaping`**: `hasMore` and `total` after post-hoc narrowing.
//! - **`handlers`**: Axum handlers and router for `/media/search` and `/media/pit`.
//! - **`protocol`**: endpoints, headers and JSON bodies.
//! - **`tokenizer`**: term extraction for queries and stored text.
//! - **`types`**: media records and page request/response types.

pub mod coordinator;
pub mod handlers;
pub mod protocol;
pub mod shaping;
pub mod tokenizer;
pub mod types;
