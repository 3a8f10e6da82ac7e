//! Authenticated HTTP client for the Eventhub API.
//!
//! [`ApiClient`] attaches the session's bearer token to every request. When
//! the backend rejects a token with 401, the client renews it once with the
//! refresh token and replays the request once. If renewal is impossible the
//! session is invalidated and the caller gets [`ApiError::SessionInvalidated`].
//!
//! # Concurrent refreshes
//!
//! Refreshes are serialized behind an async mutex and keyed on the session
//! epoch the failed request was sent under. When several requests fail with
//! the same stale token, the first one to take the lock performs the refresh;
//! the others observe the newer epoch and replay with the token it produced.

use std::sync::Arc;

use regex::Regex;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::auth::LOGOUT_PATH;
use crate::cache::{TtlCache, cache_key};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::pagination::{ListQuery, Page};
use crate::session::{SessionStore, TokenPair};

/// Path of the token refresh endpoint. A 401 from it is never retried.
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Endpoints whose 401 is returned to the caller without a refresh.
const NO_REFRESH_PATHS: &[&str] = &[REFRESH_PATH, LOGOUT_PATH];

/// Cheaply cloneable handle to the API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    cache: Option<TtlCache<Value>>,
    refresh_gate: Mutex<()>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("session", &self.inner.session)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client from validated configuration.
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        config.validate().map_err(ApiError::Config)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("failed to create HTTP client: {e}")))?;

        let cache = config.cache.enabled.then(|| {
            let cache = TtlCache::new(config.cache.ttl());
            match config.cache.max_entries {
                Some(max) => cache.with_max_entries(max),
                None => cache,
            }
        });

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                session,
                cache,
                refresh_gate: Mutex::new(()),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// The response cache, if enabled.
    pub fn cache(&self) -> Option<&TtlCache<Value>> {
        self.inner.cache.as_ref()
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Sends a request and returns the JSON body, or `Value::Null` for an
    /// empty (204) response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.request_with_query(method, path, &[], body).await
    }

    pub async fn request_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let creds = self.inner.session.credentials();
        let resp = self
            .send(method.clone(), path, query, body, creds.access_token.as_deref())
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED
            || NO_REFRESH_PATHS.contains(&path)
            || creds.is_anonymous()
        {
            return read_response(resp).await;
        }

        tracing::debug!(%method, path, "access token rejected, refreshing");
        let token = self.refresh_after_unauthorized(creds.epoch).await?;
        let retried = self.send(method, path, query, body, Some(&token)).await?;
        read_response(retried).await
    }

    /// Sends a request and deserializes the JSON body into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(method, path, body).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// GET through the response cache.
    pub async fn get_cached(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let Some(cache) = self.cache() else {
            return self
                .request_with_query(Method::GET, path, query, None)
                .await;
        };

        let key = cache_key(path, query);
        if let Some(hit) = cache.get(&key) {
            tracing::debug!(key, "serving from cache");
            return Ok(hit);
        }

        let value = self
            .request_with_query(Method::GET, path, query, None)
            .await?;
        cache.set(key, value.clone());
        Ok(value)
    }

    /// Fetches one page of a collection, normalized.
    pub async fn list(&self, path: &str, query: &ListQuery) -> Result<Page<Value>, ApiError> {
        let value = self.get_cached(path, &query.to_params()).await?;
        Ok(Page::from_value(&value))
    }

    /// Evicts every cached response under `path_prefix`.
    pub fn invalidate_cached(&self, path_prefix: &str) -> usize {
        let Some(cache) = self.cache() else {
            return 0;
        };
        match Regex::new(&format!("^{}", regex::escape(path_prefix))) {
            Ok(pattern) => cache.clear_pattern(&pattern),
            Err(e) => {
                tracing::warn!(error = %e, path_prefix, "invalid cache pattern");
                0
            }
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.cache() {
            cache.clear();
        }
    }

    /// Health endpoint, outside the authenticated API.
    pub async fn health(&self) -> Result<(u16, String), ApiError> {
        let url = format!("{}/api/health", self.inner.base_url);
        let resp = self.inner.http.get(&url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok((status, body))
    }

    /// Returns a usable access token after a 401 received under `epoch`.
    async fn refresh_after_unauthorized(&self, epoch: u64) -> Result<String, ApiError> {
        let _gate = self.inner.refresh_gate.lock().await;
        let session = &self.inner.session;

        let current = session.credentials();
        if current.epoch != epoch {
            // Another request already refreshed or dropped the session
            return match current.access_token {
                Some(token) => {
                    tracing::debug!("reusing token from concurrent refresh");
                    Ok(token)
                }
                None => Err(ApiError::SessionInvalidated),
            };
        }

        let Some(refresh_token) = session.refresh_token() else {
            tracing::debug!("no refresh token available");
            self.drop_session();
            return Err(ApiError::SessionInvalidated);
        };

        match self.exchange_refresh_token(&refresh_token).await {
            Ok(tokens) => {
                let access = tokens.access_token.clone();
                session.update_tokens(tokens)?;
                Ok(access)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                self.drop_session();
                Err(ApiError::SessionInvalidated)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let body = json!({ "refreshToken": refresh_token });
        let resp = self
            .send(Method::POST, REFRESH_PATH, &[], Some(&body), None)
            .await?;
        let value = read_response(resp).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn drop_session(&self) {
        self.clear_cache();
        self.inner.session.invalidate();
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut req = self
            .inner
            .http
            .request(method, &url)
            .header("Accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send().await.map_err(|e| {
            tracing::warn!(url, error = %e, "request failed");
            ApiError::Network(e.to_string())
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.inner.base_url, path)
        } else {
            format!("{}/{}", self.inner.base_url, path)
        }
    }
}

async fn read_response(resp: Response) -> Result<Value, ApiError> {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    let body = resp.text().await?;

    if !status.is_success() {
        return Err(ApiError::from_response(status, &body));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn client(base_url: &str) -> ApiClient {
        let session = Arc::new(SessionStore::restore(Arc::new(MemoryStorage::new())).unwrap());
        ApiClient::new(&ClientConfig::default().with_base_url(base_url), session).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let c = client("http://localhost:5000/");
        assert_eq!(c.base_url(), "http://localhost:5000");
        assert_eq!(c.url("/api/events"), "http://localhost:5000/api/events");
        assert_eq!(c.url("api/events"), "http://localhost:5000/api/events");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let session = Arc::new(SessionStore::restore(Arc::new(MemoryStorage::new())).unwrap());
        let err = ApiClient::new(&ClientConfig::default().with_base_url("nope"), session)
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn test_invalidate_cached_escapes_prefix() {
        let c = client("http://localhost:5000");
        let cache = c.cache().unwrap();
        cache.set("/api/events?{\"page\":[\"1\"]}", Value::Null);
        cache.set("/api/events/1", Value::Null);
        cache.set("/api/eventsXcount", Value::Null);
        cache.set("/api/users", Value::Null);

        assert_eq!(c.invalidate_cached("/api/events?"), 1);
        assert_eq!(c.invalidate_cached("/api/events"), 2);
        assert_eq!(cache.stats().keys, vec!["/api/users".to_string()]);
    }

    #[test]
    fn test_cache_can_be_disabled() {
        let session = Arc::new(SessionStore::restore(Arc::new(MemoryStorage::new())).unwrap());
        let mut cfg = ClientConfig::default();
        cfg.cache.enabled = false;
        let c = ApiClient::new(&cfg, session).unwrap();
        assert!(c.cache().is_none());
        assert_eq!(c.invalidate_cached("/api"), 0);
    }
}
