//! Elasticsearch Adapter
//!
//! Thin call-through to an Elasticsearch cluster's point-in-time API:
//! - `POST /{index}/_pit?keep_alive=..` opens a cursor.
//! - `POST /_search` with a `pit` block pages through it using `search_after`.
//! - `DELETE /_pit` closes it.
//!
//! Transport failures are retried with jittered exponential backoff; every attempt is
//! bounded by the configured request timeout. Engine error bodies are reduced to
//! `type: reason` and classified (cursor-invalid vs. everything else).

use super::types::{BackendPage, KeepAlive, PageQuery};
use super::{BackendError, SearchBackend};
use crate::cursor::types::{ContinuationKey, CursorId};
use crate::search::types::MediaItem;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Fields the keyword query is matched against.
const TEXT_FIELDS: &[&str] = &["suchtext", "fotografen", "bildnummer"];

#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. `https://localhost:9200`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    /// Keep-alive renewed with every page query.
    pub keep_alive: KeepAlive,
    pub request_timeout: Duration,
    pub max_retries: usize,
}

pub struct ElasticsearchBackend {
    config: ElasticsearchConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct OpenPitResponse {
    id: String,
}

#[derive(Deserialize)]
struct SearchBody {
    pit_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: Option<HitsTotal>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct HitsTotal {
    value: u64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: MediaItem,
    #[serde(default)]
    sort: Vec<serde_json::Value>,
}

impl ElasticsearchBackend {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config: ElasticsearchConfig {
                url: config.url.trim_end_matches('/').to_string(),
                ..config
            },
            http_client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, BackendError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let attempts = self.config.max_retries.max(1);
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .authorize(build(&self.http_client))
                .timeout(self.config.request_timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(BackendError::Transport(e));
                    }
                    tracing::debug!("Engine request failed (attempt {}): {}", attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(BackendError::Unavailable("Retry attempts exhausted".to_string()))
    }

    fn search_body(&self, query: &PageQuery) -> serde_json::Value {
        let text_query = if query.query.trim().is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "multi_match": { "query": query.query, "fields": TEXT_FIELDS } })
        };

        let filter: Vec<serde_json::Value> = query
            .type_filter
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| json!({ "term": { "db": t } }))
            .collect();

        let mut body = json!({
            "size": query.limit,
            "query": { "bool": { "must": [text_query], "filter": filter } },
            "pit": { "id": query.cursor_id.as_str(), "keep_alive": self.config.keep_alive.to_string() },
            "sort": [
                { "datum": { "order": "desc", "missing": "_last" } },
                { "bildnummer": { "order": "asc" } }
            ],
            "track_total_hits": true
        });

        if let Some(key) = &query.continuation_key {
            body["search_after"] = serde_json::Value::Array(key.0.clone());
        }
        body
    }
}

/// Turns a non-success engine response into a classified error.
async fn engine_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = describe_engine_error(&body).unwrap_or(body);

    if status.is_client_error() && status != reqwest::StatusCode::NOT_FOUND {
        let error = BackendError::from_engine_message(message);
        if error.is_cursor_invalid() {
            return error;
        }
        return BackendError::Rejected(format!("{} ({})", error, status));
    }
    BackendError::from_engine_message(format!("{} ({})", message, status))
}

/// Extracts `type: reason` from an engine error body.
fn describe_engine_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let root = error
        .get("root_cause")
        .and_then(|causes| causes.get(0))
        .unwrap_or(error);

    let kind = root.get("type").and_then(|v| v.as_str()).unwrap_or("error");
    let reason = root.get("reason").and_then(|v| v.as_str()).unwrap_or("");
    Some(format!("{}: {}", kind, reason))
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn check_connection(&self) -> Result<(), BackendError> {
        let url = format!("{}/_cluster/health", self.config.url);
        let response = self.send_with_retry(|client| client.get(&url)).await?;

        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }
        tracing::info!("Elasticsearch reachable at {}", self.config.url);
        Ok(())
    }

    async fn open_cursor(&self, keep_alive: KeepAlive) -> Result<CursorId, BackendError> {
        let url = format!("{}/{}/_pit", self.config.url, self.config.index);
        let keep_alive = keep_alive.to_string();
        let response = self
            .send_with_retry(|client| client.post(&url).query(&[("keep_alive", &keep_alive)]))
            .await?;

        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }

        let pit: OpenPitResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(CursorId(pit.id))
    }

    async fn query_page(&self, query: PageQuery) -> Result<BackendPage, BackendError> {
        let url = format!("{}/_search", self.config.url);
        let body = self.search_body(&query);
        let response = self
            .send_with_retry(|client| client.post(&url).json(&body))
            .await?;

        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }

        let result: SearchBody = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let continuation_key = result
            .hits
            .hits
            .last()
            .filter(|hit| !hit.sort.is_empty())
            .map(|hit| ContinuationKey(hit.sort.clone()));
        let total = result.hits.total.map(|t| t.value).unwrap_or(0);
        let items = result
            .hits
            .hits
            .into_iter()
            .map(|hit| MediaItem {
                id: hit.id,
                ..hit.source
            })
            .collect();

        Ok(BackendPage {
            items,
            total,
            continuation_key,
            cursor_id: result.pit_id.map(CursorId).unwrap_or(query.cursor_id),
        })
    }

    async fn close_cursor(&self, cursor_id: &CursorId) -> Result<(), BackendError> {
        let url = format!("{}/_pit", self.config.url);
        let body = json!({ "id": cursor_id.as_str() });
        let response = self
            .send_with_retry(|client| client.delete(&url).json(&body))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("PIT {} was already gone", cursor_id);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(engine_error(response).await);
        }
        Ok(())
    }
}
