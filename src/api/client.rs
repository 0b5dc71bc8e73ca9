//! # REST API Client
//!
//! Thin reqwest wrapper for the storefront backend. Successful responses are
//! JSON envelopes of the form `{ "status": ..., "data": { "data": <payload> } }`;
//! callers only ever see the payload. Non-2xx responses become
//! [`ProviderError`]s, with 401/403 mapped to the fixed authorization messages.

use reqwest::{header, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::core::config::ApiConfig;
use crate::core::error::{ProviderError, ProviderResult};

/// JSON client for the storefront API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<String>,
    auth_token: Option<Arc<String>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ProviderResult<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| ProviderError::config(format!("Invalid API base URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: Arc::new(config.base_url.trim_end_matches('/').to_string()),
            auth_token: config.auth_token.clone().map(Arc::new),
        })
    }

    /// Same client with a different bearer token (login/logout)
    pub fn with_auth_token(&self, token: Option<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: Arc::clone(&self.base_url),
            auth_token: token.map(Arc::new),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a resource path onto the base URL
    pub fn url(&self, path: &str) -> ProviderResult<Url> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| ProviderError::config(format!("Invalid request URL '{}': {}", joined, e)))
    }

    pub async fn get(&self, path: &str) -> ProviderResult<Value> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ProviderResult<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> ProviderResult<Value> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ProviderResult<Value> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> ProviderResult<Value> {
        let url = self.url(path)?;
        debug!(method = %method, url = %url, "Sending API request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.as_str());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| ProviderError::network(e.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| ProviderError::network(e.to_string()))?;

        let parsed: Option<Value> = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        if !status.is_success() {
            debug!(method = %method, path, status = status.as_u16(), "API request failed");
            return Err(error_from_response(status, parsed.as_ref()));
        }

        match parsed {
            None if bytes.is_empty() || status == StatusCode::NO_CONTENT => Ok(Value::Null),
            None => Err(ProviderError::decode(format!(
                "Response from '{}' is not valid JSON",
                path
            ))),
            Some(body) => {
                if let Some(err) = envelope_failure(status, &body) {
                    return Err(err);
                }
                Ok(unwrap_envelope(body))
            }
        }
    }
}

/// Extract the payload from `{ status, data: { data: payload } }`.
///
/// Falls back to `data` when it has no nested `data`, and to the whole body
/// when there is no `data` at all.
pub fn unwrap_envelope(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        if let Some(data) = map.remove("data") {
            return match data {
                Value::Object(mut inner) => match inner.remove("data") {
                    Some(payload) => payload,
                    None => Value::Object(inner),
                },
                other => other,
            };
        }
    }
    body
}

fn backend_message(body: Option<&Value>) -> Option<String> {
    body.and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_from_response(status: StatusCode, body: Option<&Value>) -> ProviderError {
    ProviderError::from_status(status.as_u16(), backend_message(body))
}

/// A 2xx envelope whose `status` says `fail`/`error`
fn envelope_failure(status: StatusCode, body: &Value) -> Option<ProviderError> {
    match body.get("status").and_then(Value::as_str) {
        Some("fail") | Some("error") => Some(ProviderError::api(
            status.as_u16(),
            backend_message(Some(body)).unwrap_or_else(|| "Request failed".to_string()),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(1),
            auth_token: None,
        })
        .unwrap()
    }

    #[test]
    fn test_unwrap_envelope_variants() {
        assert_eq!(
            unwrap_envelope(json!({ "status": "success", "data": { "data": [1, 2] } })),
            json!([1, 2])
        );
        assert_eq!(
            unwrap_envelope(json!({ "status": "success", "data": { "stats": 3 } })),
            json!({ "stats": 3 })
        );
        assert_eq!(unwrap_envelope(json!({ "plain": true })), json!({ "plain": true }));
        assert_eq!(unwrap_envelope(json!([1])), json!([1]));
    }

    #[test]
    fn test_url_joining() {
        let client = client("http://localhost:3000/api/v1/");
        assert_eq!(
            client.url("/tours/42").unwrap().as_str(),
            "http://localhost:3000/api/v1/tours/42"
        );
        assert_eq!(client.base_url(), "http://localhost:3000/api/v1");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = ApiClient::new(&ApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ProviderError::Configuration { .. })));
    }

    #[test]
    fn test_envelope_failure_status() {
        let body = json!({ "status": "fail", "message": "Tour is sold out" });
        let err = envelope_failure(StatusCode::OK, &body).unwrap();
        assert_eq!(err.message(), "Tour is sold out");
        assert!(envelope_failure(StatusCode::OK, &json!({ "status": "success" })).is_none());
    }
}
