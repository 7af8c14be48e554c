//! Error taxonomy for the client data layer.
//!
//! DESIGN
//! ======
//! One error type crosses every public boundary so callers can match on the
//! failure class without caring which layer produced it. Variants carry
//! owned strings instead of source errors because cached fetch results are
//! shared between waiters and must be `Clone`.

use reqwest::StatusCode;

/// Fallback shown when the server gave no usable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

// =============================================================================
// API ERROR
// =============================================================================

/// Errors produced by HTTP, cache, and auth operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, reset).
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The server answered with a non-2xx status.
    #[error("server error: status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    ServerError { status: u16, message: Option<String> },

    /// Input rejected before sending, or a response body with the wrong shape.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// An authenticated call was rejected as unauthorized.
    #[error("credential rejected by server")]
    StaleCredential { message: Option<String> },

    /// The persisted token slot could not be read or written.
    #[error("token storage failed: {0}")]
    Storage(String),

    /// The client could not be configured.
    #[error("config error: {0}")]
    Config(String),
}

impl ApiError {
    /// Build a `ServerError` (or `StaleCredential`) from a status and raw body.
    ///
    /// `authenticated` tells whether the request carried a bearer token; only
    /// then does a 401 imply the credential itself went stale.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &str, authenticated: bool) -> Self {
        let message = extract_message(body);
        if authenticated && status == StatusCode::UNAUTHORIZED {
            return Self::StaleCredential { message };
        }
        Self::ServerError { status: status.as_u16(), message }
    }

    /// Stable code for logs and CLI exit reporting.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NetworkFailure(_) => "E_NETWORK",
            Self::ServerError { .. } => "E_SERVER",
            Self::ValidationFailure(_) => "E_VALIDATION",
            Self::StaleCredential { .. } => "E_STALE_CREDENTIAL",
            Self::Storage(_) => "E_STORAGE",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// `true` when the failure means the stored credential must be dropped.
    #[must_use]
    pub fn is_stale_credential(&self) -> bool {
        matches!(self, Self::StaleCredential { .. })
    }

    /// Message suitable for showing to an end user.
    ///
    /// Server-provided text wins; otherwise a generic fallback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ServerError { message: Some(message), .. } | Self::StaleCredential { message: Some(message) } => {
                message.clone()
            }
            Self::ValidationFailure(message) => message.clone(),
            Self::StaleCredential { message: None } => "Your session has expired. Please log in again.".to_owned(),
            _ => GENERIC_FAILURE_MESSAGE.to_owned(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::ValidationFailure(error.to_string());
        }
        Self::NetworkFailure(error.to_string())
    }
}

impl From<crate::storage::StorageError> for ApiError {
    fn from(error: crate::storage::StorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Pull `message` (or `error`) out of a JSON error body.
fn extract_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(serde_json::Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
