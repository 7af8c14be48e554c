//! Cached reads and invalidating writes over the REST API.
//!
//! DESIGN
//! ======
//! Queries go through [`QueryCache::fetch`] under a [`QueryKey`]; mutations
//! call the API once and, on success, invalidate whatever the fixed table in
//! [`crate::invalidation`] names. Nothing is patched optimistically: the next
//! read fetches authoritative state.
//!
//! SYSTEM CONTEXT
//! ==============
//! Login and register write the auth store, never the cache. Logout clears
//! both. Any call rejected with a stale credential ends the session the same
//! way logout does, then returns the error to the caller.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::AuthStore;
use crate::cache::{FetchPolicy, QueryCache, QueryKey};
use crate::error::ApiError;
use crate::http::HttpClient;
use crate::invalidation::{self, MutationKind};
use crate::types::{
    Animation, AnimationQuery, CreateAnimation, Download, ListingPage, MarketplaceFeed, Page, UpdateAnimation,
    UpdateProfile, User,
};
use crate::validate::{self, RegisterForm};

#[derive(Clone, Debug)]
pub struct Resources {
    http: HttpClient,
    cache: QueryCache,
    auth: AuthStore,
    pending: Arc<AtomicUsize>,
}

/// Decrements the pending-mutation counter when the mutation settles or is dropped.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `None` for a blank identifier, which disables the query.
fn enabled(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl Resources {
    #[must_use]
    pub fn new(http: HttpClient, cache: QueryCache, auth: AuthStore) -> Self {
        Self { http, cache, auth, pending: Arc::new(AtomicUsize::new(0)) }
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.cache.is_fetching(key)
    }

    /// Mutations started but not yet settled.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Animation list for `query`. Empty filters are treated as absent.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn animations(&self, query: &AnimationQuery, policy: FetchPolicy) -> Result<Arc<Page<Animation>>, ApiError> {
        let http = self.http.clone();
        let query = query.normalized();
        let owned = query.clone();
        self.query(QueryKey::Animations(query), policy, move || async move {
            http.list_animations(&owned).await
        })
        .await
    }

    /// Single animation. A blank `id` returns `Ok(None)` without a request.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn animation(&self, id: &str, policy: FetchPolicy) -> Result<Option<Arc<Animation>>, ApiError> {
        let Some(id) = enabled(id) else {
            return Ok(None);
        };
        let http = self.http.clone();
        let owned = id.to_owned();
        self.query(QueryKey::Animation(id.to_owned()), policy, move || async move {
            http.get_animation(&owned).await
        })
        .await
        .map(Some)
    }

    /// The logged-in user. Disabled (returns `Ok(None)`) while no token is held.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error. A rejected token also ends the session.
    pub async fn current_user(&self, policy: FetchPolicy) -> Result<Option<Arc<User>>, ApiError> {
        if self.auth.token().is_none() {
            return Ok(None);
        }
        let http = self.http.clone();
        let user: Arc<User> = self.query(QueryKey::CurrentUser, policy, move || async move { http.me().await }).await?;
        self.auth.set_user(User::clone(&user));
        Ok(Some(user))
    }

    /// Public profile. A blank `username` returns `Ok(None)` without a request.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn user_profile(&self, username: &str, policy: FetchPolicy) -> Result<Option<Arc<User>>, ApiError> {
        let Some(username) = enabled(username) else {
            return Ok(None);
        };
        let http = self.http.clone();
        let owned = username.to_owned();
        self.query(QueryKey::UserProfile(username.to_owned()), policy, move || async move {
            http.get_user_profile(&owned).await
        })
        .await
        .map(Some)
    }

    /// A user's gallery. A blank `username` returns `Ok(None)` without a request.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn user_animations(
        &self,
        username: &str,
        policy: FetchPolicy,
    ) -> Result<Option<Arc<Page<Animation>>>, ApiError> {
        let Some(username) = enabled(username) else {
            return Ok(None);
        };
        let http = self.http.clone();
        let owned = username.to_owned();
        self.query(QueryKey::UserAnimations(username.to_owned()), policy, move || async move {
            http.get_user_animations(&owned).await
        })
        .await
        .map(Some)
    }

    /// Featured marketplace page. Pages start at 1; `0` reads page 1.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn featured(&self, page: u32, policy: FetchPolicy) -> Result<Arc<ListingPage>, ApiError> {
        self.marketplace(MarketplaceFeed::Featured, page, policy).await
    }

    /// Trending marketplace page. Pages start at 1; `0` reads page 1.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error.
    pub async fn trending(&self, page: u32, policy: FetchPolicy) -> Result<Arc<ListingPage>, ApiError> {
        self.marketplace(MarketplaceFeed::Trending, page, policy).await
    }

    async fn marketplace(
        &self,
        feed: MarketplaceFeed,
        page: u32,
        policy: FetchPolicy,
    ) -> Result<Arc<ListingPage>, ApiError> {
        let page = page.max(1);
        let http = self.http.clone();
        self.query(QueryKey::Marketplace(feed, page), policy, move || async move { http.marketplace(feed, page).await })
            .await
    }

    async fn query<T, F, Fut>(&self, key: QueryKey, policy: FetchPolicy, fetcher: F) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let result = self.cache.fetch(key, policy, fetcher).await;
        if let Err(error) = &result {
            self.observe_error(error);
        }
        result
    }

    // =========================================================================
    // AUTH MUTATIONS
    // =========================================================================

    /// Validate, call `POST /auth/login`, and store the session.
    ///
    /// # Errors
    ///
    /// Returns a validation failure before any request, or the request error.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request = validate::login(email, password)?;
        let response = self.mutate(MutationKind::Login, None, self.http.login(&request)).await?;
        self.auth.login(response.user.clone(), response.token)?;
        Ok(response.user)
    }

    /// Validate, call `POST /auth/register`, and store the session.
    ///
    /// # Errors
    ///
    /// Returns a validation failure before any request, or the request error.
    pub async fn register(&self, form: &RegisterForm) -> Result<User, ApiError> {
        let request = validate::register(form)?;
        let response = self.mutate(MutationKind::Register, None, self.http.register(&request)).await?;
        self.auth.login(response.user.clone(), response.token)?;
        Ok(response.user)
    }

    /// End the session: notify the server (best effort), clear the auth store
    /// and drop every cached value.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted token cannot be removed.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.auth.token().is_some() {
            if let Err(error) = self.http.logout().await {
                tracing::debug!(error = %error, "server logout failed; clearing local session anyway");
            }
        }
        self.end_session()
    }

    // =========================================================================
    // ANIMATION MUTATIONS
    // =========================================================================

    /// `POST /animations`; invalidates every animation list.
    ///
    /// # Errors
    ///
    /// Returns a validation failure before any request, or the request error.
    pub async fn create_animation(&self, form: &CreateAnimation) -> Result<Animation, ApiError> {
        validate::create_animation(form)?;
        self.mutate(MutationKind::CreateAnimation, None, self.http.create_animation(form)).await
    }

    /// `POST /animations/:id/like`; invalidates that animation's record.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for a blank id, or the request error.
    pub async fn like_animation(&self, id: &str) -> Result<(), ApiError> {
        let id = validate::identifier("Animation id", id)?;
        self.mutate(MutationKind::LikeAnimation, Some(id), self.http.like_animation(id)).await
    }

    /// `DELETE /animations/:id`; invalidates every animation list.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for a blank id, or the request error.
    pub async fn delete_animation(&self, id: &str) -> Result<(), ApiError> {
        let id = validate::identifier("Animation id", id)?;
        self.mutate(MutationKind::DeleteAnimation, Some(id), self.http.delete_animation(id)).await
    }

    /// `PUT /animations/:id`; invalidates the record and every list.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for a blank id or an empty update, or the
    /// request error.
    pub async fn update_animation(&self, id: &str, update: &UpdateAnimation) -> Result<Animation, ApiError> {
        let id = validate::identifier("Animation id", id)?;
        if update.is_empty() {
            return Err(ApiError::ValidationFailure("Nothing to update".into()));
        }
        self.mutate(MutationKind::UpdateAnimation, Some(id), self.http.update_animation(id, update)).await
    }

    /// `GET /animations/:id/download`. Not cached.
    ///
    /// # Errors
    ///
    /// Returns a validation failure for a blank id, or the request error.
    pub async fn download_animation(&self, id: &str) -> Result<Download, ApiError> {
        let id = validate::identifier("Animation id", id)?;
        let result = self.http.download_animation(id).await;
        if let Err(error) = &result {
            self.observe_error(error);
        }
        result
    }

    // =========================================================================
    // PROFILE MUTATIONS
    // =========================================================================

    /// `PUT /users/me`; invalidates the current-user key and refreshes the
    /// auth store's copy of the user.
    ///
    /// # Errors
    ///
    /// Returns a validation failure before any request, or the request error.
    pub async fn update_profile(&self, update: &UpdateProfile) -> Result<User, ApiError> {
        validate::update_profile(update)?;
        let user = self.mutate(MutationKind::UpdateProfile, None, self.http.update_profile(update)).await?;
        self.auth.set_user(user.clone());
        Ok(user)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn mutate<T, Fut>(&self, kind: MutationKind, id: Option<&str>, request: Fut) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _pending = PendingGuard::start(&self.pending);
        tracing::debug!(?kind, id, "mutation started");
        match request.await {
            Ok(value) => {
                let invalidated =
                    self.cache.invalidate(|key| invalidation::keys_to_invalidate(kind, id, key));
                tracing::debug!(?kind, id, invalidated, "mutation succeeded");
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(?kind, id, error = %error, "mutation failed");
                self.observe_error(&error);
                Err(error)
            }
        }
    }

    fn observe_error(&self, error: &ApiError) {
        if !error.is_stale_credential() {
            return;
        }
        tracing::warn!("credential rejected by server; ending session");
        if let Err(storage) = self.end_session() {
            tracing::warn!(error = %storage, "could not remove persisted credential");
        }
    }

    fn end_session(&self) -> Result<(), ApiError> {
        let result = self.auth.logout();
        self.cache.clear();
        result
    }
}

#[cfg(test)]
#[path = "resources_test.rs"]
mod tests;
