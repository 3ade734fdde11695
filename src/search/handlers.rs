use super::coordinator::{PaginationCoordinator, SearchError};
use super::protocol::{
    CreatePitRequest, CreatePitResponse, ENDPOINT_PIT, ENDPOINT_SEARCH, ErrorResponse,
    HEADER_CURRENT_PAGE, HEADER_PIT_ID, HEADER_SEARCH_AFTER, SearchParams, SearchResponse,
};
use super::types::PageRequest;
use crate::backend::types::KeepAlive;
use crate::cursor::types::{ContinuationKey, CursorId};

use axum::extract::{Path, Query};
use axum::http::header::ToStrError;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;

/// Error body returned by every media endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    /// Maps a coordinator error: malformed input is the caller's fault, anything else is ours.
    fn from_search(error: SearchError, context: &'static str) -> Self {
        match error {
            SearchError::MalformedInput(message) => {
                Self::new(StatusCode::BAD_REQUEST, context, message)
            }
            SearchError::Backend(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, context, e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Media routes, un-prefixed. Mount under [`super::protocol::API_PREFIX`].
pub fn router(coordinator: Arc<PaginationCoordinator>) -> Router {
    Router::new()
        .route(ENDPOINT_SEARCH, get(handle_search))
        .route(ENDPOINT_PIT, post(handle_create_pit))
        .route(&format!("{}/:id", ENDPOINT_PIT), delete(handle_delete_pit))
        .layer(Extension(coordinator))
}

pub async fn handle_search(
    Extension(coordinator): Extension<Arc<PaginationCoordinator>>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Result<Json<SearchResponse>, ApiError> {
    // Headers are validated before any engine call.
    let invalid_key = || {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "Invalid search_after parameter",
            "The search_after parameter could not be parsed as a JSON array",
        )
    };
    let raw_key = header_str(&headers, HEADER_SEARCH_AFTER).map_err(|e| {
        tracing::warn!("Unreadable {} header: {}", HEADER_SEARCH_AFTER, e);
        invalid_key()
    })?;
    let continuation_key = match raw_key {
        Some(raw) => Some(ContinuationKey::parse(raw).map_err(|e| {
            tracing::warn!("Rejected {} header: {}", HEADER_SEARCH_AFTER, e);
            invalid_key()
        })?),
        None => None,
    };

    let cursor_id = header_str(&headers, HEADER_PIT_ID)
        .map_err(|e| {
            tracing::warn!("Unreadable {} header: {}", HEADER_PIT_ID, e);
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "Invalid pit id",
                "The PIT id header must be visible ASCII",
            )
        })?
        .map(CursorId::from);
    // Only a hint; an unreadable value is ignored.
    let page_hint = header_str(&headers, HEADER_CURRENT_PAGE)
        .ok()
        .flatten()
        .and_then(|raw| raw.parse::<u32>().ok());

    let settings = coordinator.settings();
    let request = PageRequest {
        query: params.q.unwrap_or_default().trim().to_string(),
        type_filter: params
            .type_filter
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        requested_page: parse_positive(params.page.as_deref()).unwrap_or(1),
        limit: parse_positive(params.limit.as_deref())
            .map(|l| l as usize)
            .unwrap_or(settings.default_limit),
        cursor_id,
        continuation_key,
        page_hint,
    };

    tracing::debug!(
        "Search q='{}' type={:?} page={} limit={} pit={:?}",
        request.query,
        request.type_filter,
        request.requested_page,
        request.limit,
        request.cursor_id
    );

    match coordinator.fetch_page(request).await {
        Ok(page) => Ok(Json(SearchResponse::from(page))),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            Err(ApiError::from_search(e, "Search failed"))
        }
    }
}

pub async fn handle_create_pit(
    Extension(coordinator): Extension<Arc<PaginationCoordinator>>,
    body: Option<Json<CreatePitRequest>>,
) -> Result<Json<CreatePitResponse>, ApiError> {
    let keep_alive = match body.and_then(|Json(req)| req.keep_alive) {
        Some(raw) => Some(raw.parse::<KeepAlive>().map_err(|e| {
            ApiError::from_search(SearchError::MalformedInput(e.to_string()), "Failed to create PIT")
        })?),
        None => None,
    };

    match coordinator.open_cursor(keep_alive).await {
        Ok(pit_id) => Ok(Json(CreatePitResponse { pit_id })),
        Err(e) => {
            tracing::error!("Failed to create PIT: {}", e);
            Err(ApiError::from_search(e, "Failed to create PIT"))
        }
    }
}

pub async fn handle_delete_pit(
    Extension(coordinator): Extension<Arc<PaginationCoordinator>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match coordinator.close_cursor(&CursorId(id)).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            tracing::error!("Failed to delete PIT: {}", e);
            Err(ApiError::from_search(e, "Failed to delete PIT"))
        }
    }
}

/// A header's trimmed value; `Ok(None)` when absent or blank, an error when present
/// but not visible ASCII.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ToStrError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value.to_str()?.trim();
    Ok((!value.is_empty()).then_some(value))
}

/// Parses a positive integer; zero, negatives and garbage yield `None`.
fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|n| *n > 0)
}
