//! Declarative form validation and CSRF double-submit tokens.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::config::CSRF_COOKIE_NAME;

pub const CSRF_ERROR: &str = "Invalid or missing CSRF token.";

#[derive(Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub csrf_token: String,
}

/// Flattens validator output into user-facing messages for inline render.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|field| field.iter())
        .map(|err| {
            err.message
                .as_ref()
                .map(|msg| msg.to_string())
                .unwrap_or_else(|| "Invalid value".to_string())
        })
        .collect();
    messages.sort();
    messages
}

/// Returns the CSRF token for this client, minting the cookie on first use.
/// The same token is embedded as a hidden form field (double-submit).
pub fn issue_csrf(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(CSRF_COOKIE_NAME) {
        let token = cookie.value().to_string();
        return (jar, token);
    }
    let token = Uuid::new_v4().to_string();
    let jar = jar.add(
        Cookie::build((CSRF_COOKIE_NAME, token.clone()))
            .path("/")
            .http_only(true)
            .build(),
    );
    (jar, token)
}

/// A submission is genuine only when the hidden field matches the cookie.
pub fn verify_csrf(jar: &CookieJar, submitted: &str) -> bool {
    !submitted.is_empty()
        && jar
            .get(CSRF_COOKIE_NAME)
            .map(|cookie| cookie.value() == submitted)
            .unwrap_or(false)
}
