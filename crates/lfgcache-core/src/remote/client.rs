//! REST client for a Parse-compatible object server.
//!
//! This module provides `ParseClient`, the production `RemoteSource`. It
//! speaks the `/classes/{class}` endpoints with static application keys.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{RawObject, RemoteError, RemoteSource};
use crate::config::Config;
use crate::filter::Filter;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Page size for `find`; the largest the server accepts.
const QUERY_PAGE_LIMIT: usize = 1000;

/// Sort key for paged queries. Without one the server may reorder results
/// between pages and skip or repeat objects.
const QUERY_PAGE_ORDER: &str = "objectId";

const APPLICATION_ID_HEADER: &str = "X-Parse-Application-Id";
const REST_API_KEY_HEADER: &str = "X-Parse-REST-API-Key";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<RawObject>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(rename = "objectId")]
    object_id: String,
}

/// Parse REST client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ParseClient {
    client: Client,
    server_url: String,
}

impl ParseClient {
    pub fn new(server_url: &str, application_id: &str, rest_api_key: &str) -> Result<Self, RemoteError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            APPLICATION_ID_HEADER,
            header::HeaderValue::from_str(application_id)
                .map_err(|e| RemoteError::Configuration(format!("application id: {}", e)))?,
        );
        headers.insert(
            REST_API_KEY_HEADER,
            header::HeaderValue::from_str(rest_api_key)
                .map_err(|e| RemoteError::Configuration(format!("REST key: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let server_url = config
            .server_url
            .as_deref()
            .ok_or_else(|| RemoteError::Configuration("no server URL configured".to_string()))?;
        let application_id = config
            .application_id
            .as_deref()
            .ok_or_else(|| RemoteError::Configuration("no application id configured".to_string()))?;
        Self::new(
            server_url,
            application_id,
            config.rest_api_key.as_deref().unwrap_or_default(),
        )
    }

    fn class_url(&self, class: &str) -> String {
        format!("{}/classes/{}", self.server_url, class)
    }

    fn object_url(&self, class: &str, id: &str) -> String {
        format!("{}/classes/{}/{}", self.server_url, class, id)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    /// Send a request, backing off exponentially while the server rate limits us.
    async fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<Response, RemoteError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn find_page(
        &self,
        class: &str,
        where_clause: Option<&str>,
        skip: usize,
    ) -> Result<Vec<RawObject>, RemoteError> {
        let url = self.class_url(class);
        let params = page_params(where_clause, skip);

        let response = self
            .send(&url, || self.client.get(&url).query(&params))
            .await?;

        let page: QueryResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("query on {}: {}", class, e)))?;
        Ok(page.results)
    }
}

/// Query string for one page of a `find`.
fn page_params(where_clause: Option<&str>, skip: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("limit", QUERY_PAGE_LIMIT.to_string()),
        ("skip", skip.to_string()),
        ("order", QUERY_PAGE_ORDER.to_string()),
    ];
    if let Some(clause) = where_clause {
        params.push(("where", clause.to_string()));
    }
    params
}

#[async_trait]
impl RemoteSource for ParseClient {
    async fn find(&self, class: &str, filter: Option<&Filter>) -> Result<Vec<RawObject>, RemoteError> {
        let where_clause = filter
            .filter(|f| !f.is_empty())
            .map(|f| f.to_where().to_string());

        let mut objects = Vec::new();
        loop {
            let page = self
                .find_page(class, where_clause.as_deref(), objects.len())
                .await?;
            let page_len = page.len();
            objects.extend(page);
            if page_len < QUERY_PAGE_LIMIT {
                break;
            }
        }

        debug!(class = class, count = objects.len(), "Remote query complete");
        Ok(objects)
    }

    async fn create(&self, class: &str, fields: Map<String, Value>) -> Result<String, RemoteError> {
        let url = self.class_url(class);
        let body = Value::Object(fields);
        let response = self.send(&url, || self.client.post(&url).json(&body)).await?;

        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("create on {}: {}", class, e)))?;
        debug!(class = class, object_id = %created.object_id, "Remote object created");
        Ok(created.object_id)
    }

    async fn delete_by_id(&self, class: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.object_url(class, id);
        self.send(&url, || self.client.delete(&url)).await?;
        debug!(class = class, object_id = id, "Remote object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let client = ParseClient::new("https://lfg.example.com/parse/", "app", "key").unwrap();
        assert_eq!(client.class_url("Post"), "https://lfg.example.com/parse/classes/Post");
        assert_eq!(
            client.object_url("Post", "abc123"),
            "https://lfg.example.com/parse/classes/Post/abc123"
        );
    }

    #[test]
    fn test_page_params_have_stable_order() {
        let params = page_params(Some(r#"{"gameId":"G1"}"#), 2000);
        assert_eq!(
            params,
            vec![
                ("limit", "1000".to_string()),
                ("skip", "2000".to_string()),
                ("order", "objectId".to_string()),
                ("where", r#"{"gameId":"G1"}"#.to_string()),
            ]
        );

        let unfiltered = page_params(None, 0);
        assert!(unfiltered.contains(&("order", "objectId".to_string())));
        assert!(!unfiltered.iter().any(|(key, _)| *key == "where"));
    }

    #[test]
    fn test_from_config_requires_server() {
        let config = Config::default();
        assert!(matches!(
            ParseClient::from_config(&config),
            Err(RemoteError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_header_value_is_configuration_error() {
        assert!(matches!(
            ParseClient::new("https://lfg.example.com", "bad\nid", "key"),
            Err(RemoteError::Configuration(_))
        ));
    }
}
