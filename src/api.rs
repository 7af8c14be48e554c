//! Typed endpoint functions over [`HttpClient`].
//!
//! One method per REST endpoint. No caching and no auth-store writes happen
//! here; see `resources` for the cached, invalidating layer.

use reqwest::Method;
use reqwest::multipart::{Form, Part};

use crate::error::ApiError;
use crate::http::{Body, HttpClient};
use crate::types::{
    Animation, AnimationQuery, AuthResponse, CreateAnimation, Download, ListingPage, LoginRequest, MarketplaceFeed,
    MeResponse, Page, RegisterRequest, UpdateAnimation, UpdateProfile, User,
};

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::ValidationFailure(e.to_string()))
}

fn animation_path(id: &str) -> String {
    format!("/animations/{}", urlencoding::encode(id))
}

fn user_path(username: &str) -> String {
    format!("/users/{}", urlencoding::encode(username))
}

// =============================================================================
// AUTH
// =============================================================================

impl HttpClient {
    /// `POST /auth/login`. Sent without the stored credential.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let body = to_json(request)?;
        self.request_json_anonymous(Method::POST, "/auth/login", Body::Json(&body)).await
    }

    /// `POST /auth/register`. Sent without the stored credential.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let body = to_json(request)?;
        self.request_json_anonymous(Method::POST, "/auth/register", Body::Json(&body)).await
    }

    /// `GET /auth/me`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::StaleCredential`] when the stored token is rejected.
    pub async fn me(&self) -> Result<User, ApiError> {
        let me: MeResponse = self.request_json(Method::GET, "/auth/me", &[], Body::Empty).await?;
        Ok(me.into_user())
    }

    /// `POST /auth/logout`. Informational only; the token is dropped client-side.
    ///
    /// # Errors
    ///
    /// Propagates network and server errors.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.request_unit(Method::POST, "/auth/logout", Body::Empty).await
    }
}

// =============================================================================
// ANIMATIONS
// =============================================================================

impl HttpClient {
    /// `GET /animations?search&category&page`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn list_animations(&self, query: &AnimationQuery) -> Result<Page<Animation>, ApiError> {
        self.request_json(Method::GET, "/animations", &query.to_pairs(), Body::Empty).await
    }

    /// `GET /animations/:id`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn get_animation(&self, id: &str) -> Result<Animation, ApiError> {
        self.request_json(Method::GET, &animation_path(id), &[], Body::Empty).await
    }

    /// `POST /animations` as a multipart form.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn create_animation(&self, form: &CreateAnimation) -> Result<Animation, ApiError> {
        let mut multipart = Form::new();
        for (name, value) in form.text_fields() {
            multipart = multipart.text(name, value);
        }
        if let Some(upload) = &form.file {
            let part = Part::bytes(upload.bytes.clone())
                .file_name(upload.file_name.clone())
                .mime_str(&upload.mime)
                .map_err(|e| ApiError::ValidationFailure(format!("invalid upload mime type: {e}")))?;
            multipart = multipart.part("file", part);
        }
        self.request_json(Method::POST, "/animations", &[], Body::Multipart(multipart)).await
    }

    /// `PUT /animations/:id`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn update_animation(&self, id: &str, update: &UpdateAnimation) -> Result<Animation, ApiError> {
        let body = to_json(update)?;
        self.request_json(Method::PUT, &animation_path(id), &[], Body::Json(&body)).await
    }

    /// `DELETE /animations/:id`.
    ///
    /// # Errors
    ///
    /// Propagates network and server errors.
    pub async fn delete_animation(&self, id: &str) -> Result<(), ApiError> {
        self.request_unit(Method::DELETE, &animation_path(id), Body::Empty).await
    }

    /// `POST /animations/:id/like`.
    ///
    /// # Errors
    ///
    /// Propagates network and server errors.
    pub async fn like_animation(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("{}/like", animation_path(id));
        self.request_unit(Method::POST, &path, Body::Empty).await
    }

    /// `GET /animations/:id/download`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn download_animation(&self, id: &str) -> Result<Download, ApiError> {
        let path = format!("{}/download", animation_path(id));
        self.request_json(Method::GET, &path, &[], Body::Empty).await
    }
}

// =============================================================================
// USERS
// =============================================================================

impl HttpClient {
    /// `GET /users/:username`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn get_user_profile(&self, username: &str) -> Result<User, ApiError> {
        self.request_json(Method::GET, &user_path(username), &[], Body::Empty).await
    }

    /// `GET /users/:username/animations`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn get_user_animations(&self, username: &str) -> Result<Page<Animation>, ApiError> {
        let path = format!("{}/animations", user_path(username));
        self.request_json(Method::GET, &path, &[], Body::Empty).await
    }

    /// `PUT /users/me`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn update_profile(&self, update: &UpdateProfile) -> Result<User, ApiError> {
        let body = to_json(update)?;
        self.request_json(Method::PUT, "/users/me", &[], Body::Json(&body)).await
    }
}

// =============================================================================
// MARKETPLACE
// =============================================================================

impl HttpClient {
    /// `GET /marketplace/featured` or `/marketplace/trending`.
    ///
    /// # Errors
    ///
    /// Propagates network, server, and shape errors.
    pub async fn marketplace(&self, feed: MarketplaceFeed, page: u32) -> Result<ListingPage, ApiError> {
        let path = format!("/marketplace/{}", feed.as_str());
        self.request_json(Method::GET, &path, &[("page", page.to_string())], Body::Empty).await
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
