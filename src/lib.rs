//! Client-side data layer for the AnimaForge animation gallery.
//!
//! DESIGN
//! ======
//! Three cooperating pieces:
//! - [`http::HttpClient`] sends every request, attaching the persisted bearer
//!   token and classifying failures into [`ApiError`]. Endpoint methods live
//!   in `api`.
//! - [`resources::Resources`] wraps the endpoints in a [`cache::QueryCache`]
//!   and invalidates keys after mutations per [`invalidation::INVALIDATION_TABLE`].
//! - [`auth::AuthStore`] holds the logged-in user and token, persisted through
//!   a [`storage::TokenStorage`] backend.
//!
//! [`context::AppContext`] wires them together with an explicit lifecycle.

mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod invalidation;
pub mod resources;
pub mod storage;
pub mod types;
pub mod validate;

pub use auth::{AuthState, AuthStore, Reconciled};
pub use cache::{CacheEvent, FetchPolicy, Freshness, QueryCache, QueryKey};
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::ApiError;
pub use http::HttpClient;
pub use invalidation::{INVALIDATION_TABLE, MutationKind};
pub use resources::Resources;
pub use storage::{AUTH_TOKEN_KEY, FileStorage, MemoryStorage, TokenStorage};
