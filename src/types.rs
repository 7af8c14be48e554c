//! Wire types for the AnimaForge REST API.
//!
//! Every payload named by the API has an explicit struct here; responses are
//! parsed into these at the HTTP boundary so a shape mismatch surfaces as a
//! validation failure instead of leaking untyped JSON into callers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// USERS
// =============================================================================

/// Only `username` is required; auth responses may carry a partial user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "avatar_url", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(
        default,
        alias = "created_at",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

/// Creator reference embedded in an animation. Joined by username only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

// =============================================================================
// ANIMATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub video_url: String,
    #[serde(default)]
    pub thumbnail: String,
    pub creator: Creator,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub fps: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Filters for `GET /animations`. Also the identity of a list cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AnimationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl AnimationQuery {
    #[must_use]
    pub fn category(category: impl Into<String>) -> Self {
        Self { category: Some(category.into()), ..Self::default() }
    }

    #[must_use]
    pub fn search(search: impl Into<String>) -> Self {
        Self { search: Some(search.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Same request with empty filters dropped, so equal requests share a cache key.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Self { search: present(&self.search), category: present(&self.category), page: self.page }
    }

    /// Query-string pairs, skipping absent filters.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_owned()));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("category", category.to_owned()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }
}

/// Result of `GET /animations/:id/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub file_url: String,
    pub title: String,
    #[serde(default)]
    pub downloads: u64,
}

// =============================================================================
// MARKETPLACE
// =============================================================================

/// Curated public feeds served under `/marketplace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketplaceFeed {
    /// Public animations with many likes, most liked first.
    Featured,
    /// Public animations from the last week, most viewed first.
    Trending,
}

impl MarketplaceFeed {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Featured => "featured",
            Self::Trending => "trending",
        }
    }
}

/// A published animation as the marketplace lists it. Field names are snake_case on this surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f32>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub is_public: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One page of a marketplace feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    pub data: Vec<Listing>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

// =============================================================================
// ANIMATION WRITES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationStyle {
    Anime,
    Realistic,
    Cartoon,
    #[serde(rename = "3d")]
    ThreeD,
}

impl AnimationStyle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Realistic => "realistic",
            Self::Cartoon => "cartoon",
            Self::ThreeD => "3d",
        }
    }
}

impl std::str::FromStr for AnimationStyle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anime" => Ok(Self::Anime),
            "realistic" => Ok(Self::Realistic),
            "cartoon" => Ok(Self::Cartoon),
            "3d" => Ok(Self::ThreeD),
            other => Err(format!("unknown style '{other}' (expected anime, realistic, cartoon or 3d)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    UltraHd,
}

impl Resolution {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
            Self::UltraHd => "4k",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "720p" => Ok(Self::Hd),
            "1080p" => Ok(Self::FullHd),
            "4k" => Ok(Self::UltraHd),
            other => Err(format!("unknown resolution '{other}' (expected 720p, 1080p or 4k)")),
        }
    }
}

/// Durations in seconds the generator accepts.
pub const ALLOWED_DURATIONS_SECS: [u32; 4] = [3, 5, 10, 15];

/// A file attached to an animation upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Multipart body for `POST /animations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAnimation {
    pub prompt: String,
    pub style: AnimationStyle,
    pub duration_secs: u32,
    pub resolution: Resolution,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub file: Option<Upload>,
}

impl CreateAnimation {
    #[must_use]
    pub fn new(prompt: impl Into<String>, style: AnimationStyle, duration_secs: u32, resolution: Resolution) -> Self {
        Self {
            prompt: prompt.into(),
            style,
            duration_secs,
            resolution,
            title: None,
            description: None,
            category: None,
            tags: Vec::new(),
            file: None,
        }
    }

    /// Text fields in submission order. The file part is added separately.
    #[must_use]
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("prompt", self.prompt.clone()),
            ("style", self.style.as_str().to_owned()),
            ("duration", self.duration_secs.to_string()),
            ("resolution", self.resolution.as_str().to_owned()),
        ];
        if let Some(title) = &self.title {
            fields.push(("title", title.clone()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.clone()));
        }
        if let Some(category) = &self.category {
            fields.push(("category", category.clone()));
        }
        if !self.tags.is_empty() {
            fields.push(("tags", self.tags.join(",")));
        }
        fields
    }
}

/// JSON body for `PUT /animations/:id`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateAnimation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateAnimation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.category.is_none() && self.tags.is_none()
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// `GET /auth/me` body. The wrapped form is canonical; a bare user is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum MeResponse {
    Wrapped { user: User },
    Bare(User),
}

impl MeResponse {
    pub(crate) fn into_user(self) -> User {
        match self {
            Self::Wrapped { user } | Self::Bare(user) => user,
        }
    }
}

/// JSON body for `PUT /users/me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
