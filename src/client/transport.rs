//! Client transport to a media search node.

use super::types::SearchRequest;
use crate::backend::is_cursor_invalid_message;
use crate::cursor::types::CursorId;
use crate::search::protocol::{
    API_PREFIX, CreatePitRequest, CreatePitResponse, ENDPOINT_PIT, ENDPOINT_SEARCH,
    ErrorResponse, HEADER_CURRENT_PAGE, HEADER_PIT_ID, HEADER_SEARCH_AFTER, SearchResponse,
};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The node answered with a non-success status.
    #[error("node returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Same phrase classification the server applies to engine errors.
    pub fn is_cursor_invalid(&self) -> bool {
        match self {
            TransportError::Status { message, .. } => is_cursor_invalid_message(message),
            TransportError::Network(e) => is_cursor_invalid_message(&e.to_string()),
            TransportError::Decode(_) => false,
        }
    }
}

#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError>;
}

pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// `node_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(node_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: format!("{}{}", node_url.trim_end_matches('/'), API_PREFIX),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_pit(&self, keep_alive: Option<&str>) -> Result<CursorId, TransportError> {
        let url = format!("{}{}", self.base_url, ENDPOINT_PIT);
        let response = self
            .http_client
            .post(&url)
            .json(&CreatePitRequest {
                keep_alive: keep_alive.map(str::to_string),
            })
            .send()
            .await?;

        let body: CreatePitResponse = decode(response).await?;
        Ok(body.pit_id)
    }

    pub async fn delete_pit(&self, cursor_id: &CursorId) -> Result<(), TransportError> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            ENDPOINT_PIT,
            urlencoding::encode(cursor_id.as_str())
        );
        let response = self.http_client.delete(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let url = format!("{}{}", self.base_url, ENDPOINT_SEARCH);

        let mut params = vec![
            ("q", request.query.clone()),
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(type_filter) = &request.type_filter {
            params.push(("type", type_filter.clone()));
        }

        let mut builder = self.http_client.get(&url).query(&params);
        if let Some(cursor_id) = &request.cursor_id {
            builder = builder.header(HEADER_PIT_ID, cursor_id.as_str());
        }
        if let Some(key) = &request.continuation_key {
            builder = builder.header(HEADER_SEARCH_AFTER, key.to_header());
        }
        if let Some(page) = request.page_hint {
            builder = builder.header(HEADER_CURRENT_PAGE, page.to_string());
        }

        tracing::debug!("GET {} page={} pit={:?}", url, request.page, request.cursor_id);
        decode(builder.send().await?).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => format!("{}: {}", body.error, body.message),
        Err(_) => text,
    };
    TransportError::Status { status, message }
}
