//! Process-wide client context.
//!
//! DESIGN
//! ======
//! One `AppContext` owns the HTTP client, query cache, and auth store for the
//! life of a session. It is constructed explicitly and passed to callers,
//! never stored in a global, so tests build as many as they need.
//!
//! LIFECYCLE
//! =========
//! `start` rehydrates the token from storage and reconciles it against
//! `GET /auth/me`. `reset` ends the session locally (auth store and cache)
//! without contacting the server.

use std::sync::Arc;

use crate::auth::{AuthStore, Reconciled};
use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpClient;
use crate::resources::Resources;
use crate::storage::TokenStorage;

#[derive(Clone, Debug)]
pub struct AppContext {
    config: ClientConfig,
    resources: Resources,
}

impl AppContext {
    /// Wire the pieces together and rehydrate the auth store. No network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, storage: Arc<dyn TokenStorage>) -> Result<Self, ApiError> {
        let http = HttpClient::new(&config, storage.clone())?;
        let cache = QueryCache::new(config.stale_time);
        let auth = AuthStore::rehydrate(storage);
        tracing::debug!(api_url = %config.api_url, "client context created");
        Ok(Self { config, resources: Resources::new(http, cache, auth) })
    }

    /// [`Self::new`] followed by [`Self::reconcile`].
    ///
    /// A reconcile that fails for reasons other than a rejected credential
    /// (server unreachable, 5xx) is logged and the token kept; the context is
    /// still returned.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the HTTP client cannot be built, or a
    /// storage error while clearing a rejected token.
    pub async fn start(config: ClientConfig, storage: Arc<dyn TokenStorage>) -> Result<Self, ApiError> {
        let context = Self::new(config, storage)?;
        match context.reconcile().await {
            Ok(outcome) => tracing::debug!(?outcome, "session reconciled"),
            Err(error @ ApiError::Storage(_)) => return Err(error),
            Err(error) => tracing::warn!(error = %error, "session not verified; keeping stored credential"),
        }
        Ok(context)
    }

    /// Check the stored token against the server. A rejected token clears
    /// the auth store and the cache.
    ///
    /// # Errors
    ///
    /// Returns non-credential failures from `/auth/me` unchanged.
    pub async fn reconcile(&self) -> Result<Reconciled, ApiError> {
        let outcome = self.resources.auth().reconcile(self.resources.http()).await?;
        if outcome == Reconciled::LoggedOut {
            self.resources.cache().clear();
        }
        Ok(outcome)
    }

    /// End the session locally: clear the auth store, storage, and cache.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted token cannot be removed.
    pub fn reset(&self) -> Result<(), ApiError> {
        self.resources.cache().clear();
        self.resources.auth().logout()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    #[must_use]
    pub fn auth(&self) -> &AuthStore {
        self.resources.auth()
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        self.resources.cache()
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        self.resources.http()
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
