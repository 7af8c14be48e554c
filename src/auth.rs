//! Auth store: who is logged in, and with which credential.
//!
//! DESIGN
//! ======
//! State lives in a `tokio::sync::watch` channel so every write goes through
//! one sender and observers can await changes. The token is mirrored into
//! [`TokenStorage`] under `auth-token`; the HTTP client reads it from there,
//! never from this struct. Only `login`, `logout`, and `set_user` write.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ApiError;
use crate::http::HttpClient;
use crate::storage::{AUTH_TOKEN_KEY, TokenStorage};
use crate::types::User;

/// Snapshot of the auth state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl AuthState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }
}

/// Outcome of reconciling a rehydrated token with the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// No token was stored; nothing to check.
    Anonymous,
    /// The server accepted the token and returned this user.
    Authenticated(User),
    /// The server rejected the token; the store was cleared.
    LoggedOut,
}

#[derive(Clone)]
pub struct AuthStore {
    state: Arc<watch::Sender<AuthState>>,
    storage: Arc<dyn TokenStorage>,
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("AuthStore")
            .field("user", &state.user.as_ref().map(|u| u.username.as_str()))
            .field("has_token", &state.token.is_some())
            .finish()
    }
}

impl AuthStore {
    /// Empty store over `storage`. Does not read persisted state.
    #[must_use]
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        let (sender, _) = watch::channel(AuthState::default());
        Self { state: Arc::new(sender), storage }
    }

    /// Store rehydrated from persisted storage: token restored, user unknown.
    #[must_use]
    pub fn rehydrate(storage: Arc<dyn TokenStorage>) -> Self {
        let token = storage.get(AUTH_TOKEN_KEY).filter(|t| !t.trim().is_empty());
        tracing::debug!(has_token = token.is_some(), "auth store rehydrated");
        let (sender, _) = watch::channel(AuthState { user: None, token });
        Self { state: Arc::new(sender), storage }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Set user and token, persisting the token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Storage`] if the token cannot be persisted; in-memory
    /// state is left unchanged in that case.
    pub fn login(&self, user: User, token: String) -> Result<(), ApiError> {
        self.storage.set(AUTH_TOKEN_KEY, &token)?;
        tracing::info!(username = %user.username, "logged in");
        self.state.send_replace(AuthState { user: Some(user), token: Some(token) });
        Ok(())
    }

    /// Clear user and token, removing the persisted token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Storage`] if the persisted token cannot be removed.
    /// In-memory state is cleared regardless.
    pub fn logout(&self) -> Result<(), ApiError> {
        let previous = self.state.send_replace(AuthState::default());
        if let Some(user) = previous.user {
            tracing::info!(username = %user.username, "logged out");
        }
        self.storage.remove(AUTH_TOKEN_KEY)?;
        Ok(())
    }

    /// Replace the user copy (after `/auth/me` or a profile update) without
    /// touching the token. Ignored while logged out.
    pub fn set_user(&self, user: User) {
        self.state.send_if_modified(|state| {
            if state.token.is_none() {
                return false;
            }
            state.user = Some(user);
            true
        });
    }

    /// Check a rehydrated token against `GET /auth/me`.
    ///
    /// A rejected credential clears the store. Other failures (network,
    /// server 5xx) leave the token in place and are returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns any non-credential failure from the `/auth/me` call, or a
    /// storage error while clearing a rejected token.
    pub async fn reconcile(&self, http: &HttpClient) -> Result<Reconciled, ApiError> {
        if self.token().is_none() {
            return Ok(Reconciled::Anonymous);
        }
        match http.me().await {
            Ok(user) => {
                self.set_user(user.clone());
                Ok(Reconciled::Authenticated(user))
            }
            Err(e) if e.is_stale_credential() => {
                tracing::warn!("stored credential rejected; clearing auth state");
                self.logout()?;
                Ok(Reconciled::LoggedOut)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not verify stored credential");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
