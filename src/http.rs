//! The single outbound request sender.
//!
//! DESIGN
//! ======
//! Every request is built here: base URL joining, default JSON content type,
//! bearer credential lookup, request id tagging, and response classification.
//! The credential is read from the persisted token slot on every call rather
//! than cached, so a login or logout in the auth store takes effect on the
//! very next request. Credential exchanges (login, register) go out
//! anonymously: a 401 there is a rejected password, not a stale session.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures become `NetworkFailure`, non-2xx responses become
//! `ServerError` (or `StaleCredential` for a 401 on an authenticated call),
//! and bodies that do not match the expected type become `ValidationFailure`.
//! Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::storage::{AUTH_TOKEN_KEY, TokenStorage};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    storage: Arc<dyn TokenStorage>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

/// Whether a request carries the stored bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    Bearer,
    Anonymous,
}

/// Body to attach to an outgoing request.
pub(crate) enum Body<'a> {
    Empty,
    Json(&'a serde_json::Value),
    Multipart(reqwest::multipart::Form),
}

impl HttpClient {
    /// Build a client for `config`, reading credentials from `storage`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, storage: Arc<dyn TokenStorage>) -> Result<Self, ApiError> {
        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(format!("animaforge-client/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self { http, base_url: Arc::from(config.api_url.as_str()), storage })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/animations/2`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Current credential from persisted storage, ignoring blank values.
    #[must_use]
    pub fn credential(&self) -> Option<String> {
        self.storage.get(AUTH_TOKEN_KEY).filter(|token| !token.trim().is_empty())
    }

    /// Send a request and parse a typed JSON response.
    pub(crate) async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Body<'_>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, query, body, Auth::Bearer).await?;
        Self::parse_response(path, response).await
    }

    /// Like [`Self::request_json`], but never attaches the stored credential.
    pub(crate) async fn request_json_anonymous<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Body<'_>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, &[], body, Auth::Anonymous).await?;
        Self::parse_response(path, response).await
    }

    async fn parse_response<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        let text = response.text().await.map_err(|e| ApiError::NetworkFailure(e.to_string()))?;
        parse_body(path, &text)
    }

    /// Send a request whose response body is ignored.
    pub(crate) async fn request_unit(&self, method: Method, path: &str, body: Body<'_>) -> Result<(), ApiError> {
        self.send(method, path, &[], body, Auth::Bearer).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Body<'_>,
        auth: Auth,
    ) -> Result<Response, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let token = match auth {
            Auth::Bearer => self.credential(),
            Auth::Anonymous => None,
        };
        let authenticated = token.is_some();

        let mut builder = self.http.request(method.clone(), self.url(path)).header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if !query.is_empty() {
            builder = builder.query(query);
        }
        builder = match body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            // reqwest sets the multipart boundary content type, replacing the JSON default.
            Body::Multipart(form) => builder.multipart(form),
        };

        tracing::debug!(%method, path, %request_id, authenticated, "api request");

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%method, path, %request_id, error = %e, "api request failed");
            ApiError::NetworkFailure(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let error = ApiError::from_response(status, &text, authenticated);
        tracing::warn!(%method, path, %request_id, status = status.as_u16(), code = error.error_code(), "api error response");
        Err(error)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_owned();
    }
    format!("{base}/{path}")
}

pub(crate) fn parse_body<T: DeserializeOwned>(path: &str, text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!(path, error = %e, "response did not match expected shape");
        ApiError::ValidationFailure(format!("unexpected response from {path}: {e}"))
    })
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
