//! Client-side form validation.
//!
//! These checks run before any request is built; a failure never reaches the
//! network. Messages are user-facing.

use crate::error::ApiError;
use crate::types::{ALLOWED_DURATIONS_SECS, CreateAnimation, LoginRequest, RegisterRequest, UpdateProfile};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Raw registration form, including the confirmation field the API never sees.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Validate a login form and build the request body.
///
/// # Errors
///
/// Returns [`ApiError::ValidationFailure`] on empty fields or a malformed email.
pub fn login(email: &str, password: &str) -> Result<LoginRequest, ApiError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(invalid("Please fill in all fields"));
    }
    check_email(email)?;
    Ok(LoginRequest { email: email.to_owned(), password: password.to_owned() })
}

/// Validate a registration form and build the request body.
///
/// # Errors
///
/// Returns [`ApiError::ValidationFailure`] naming the first rule that failed.
pub fn register(form: &RegisterForm) -> Result<RegisterRequest, ApiError> {
    let username = form.username.trim();
    let email = form.email.trim();
    if username.is_empty() || email.is_empty() || form.password.is_empty() || form.confirm_password.is_empty() {
        return Err(invalid("Please fill in all fields"));
    }
    check_username(username)?;
    check_email(email)?;
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid(format!("Password must be at least {MIN_PASSWORD_LEN} characters long")));
    }
    if form.password != form.confirm_password {
        return Err(invalid("Passwords do not match"));
    }
    Ok(RegisterRequest { username: username.to_owned(), email: email.to_owned(), password: form.password.clone() })
}

/// Validate an animation creation form.
///
/// # Errors
///
/// Returns [`ApiError::ValidationFailure`] on an empty prompt or unsupported duration.
pub fn create_animation(form: &CreateAnimation) -> Result<(), ApiError> {
    if form.prompt.trim().is_empty() {
        return Err(invalid("Please describe the animation you want to create"));
    }
    if !ALLOWED_DURATIONS_SECS.contains(&form.duration_secs) {
        return Err(invalid(format!(
            "Duration must be one of {} seconds",
            ALLOWED_DURATIONS_SECS.map(|d| d.to_string()).join(", ")
        )));
    }
    if form.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(invalid("Title cannot be blank"));
    }
    Ok(())
}

/// Validate a profile update.
///
/// # Errors
///
/// Returns [`ApiError::ValidationFailure`] if a provided username or email is malformed.
pub fn update_profile(update: &UpdateProfile) -> Result<(), ApiError> {
    if let Some(username) = &update.username {
        check_username(username.trim())?;
    }
    if let Some(email) = &update.email {
        check_email(email.trim())?;
    }
    Ok(())
}

/// Reject empty path identifiers before they are spliced into a URL.
///
/// # Errors
///
/// Returns [`ApiError::ValidationFailure`] when `value` is blank.
pub fn identifier<'a>(what: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{what} is required")));
    }
    Ok(trimmed)
}

fn check_username(username: &str) -> Result<(), ApiError> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(invalid(format!("Username must be at least {MIN_USERNAME_LEN} characters long")));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ApiError> {
    if !email.contains('@') {
        return Err(invalid("Please enter a valid email address"));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::ValidationFailure(message.into())
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
