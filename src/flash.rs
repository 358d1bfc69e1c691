//! One-shot flash messages carried across redirects in a cookie.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;

use crate::config::FLASH_COOKIE_NAME;

/// A pending user-facing notice, cleared after one render.
#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

impl Flash {
    pub fn new(category: &str, message: &str) -> Self {
        Self {
            category: category.to_string(),
            message: message.to_string(),
        }
    }
}

fn encode(category: &str, message: &str) -> String {
    format!("{}:{}", category, urlencoding::encode(message))
}

/// Queues a flash message for the next rendered page.
pub fn set_flash(jar: CookieJar, category: &str, message: &str) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE_NAME, encode(category, message)))
            .path("/")
            .http_only(true)
            .build(),
    )
}

/// Removes and returns the pending flash message, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE_NAME) else {
        return (jar, None);
    };
    let flash = cookie.value().split_once(':').map(|(category, message)| Flash {
        category: category.to_string(),
        message: urlencoding::decode(message)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_default(),
    });
    let jar = jar.remove(Cookie::build(FLASH_COOKIE_NAME).path("/").build());
    (jar, flash)
}

/// Plain 302 redirect; every redirect in the app uses this status.
pub fn redirect(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// 302 redirect that also queues a flash message.
pub fn flash_redirect(location: &str, category: &str, message: &str) -> Response {
    let cookie = Cookie::build((FLASH_COOKIE_NAME, encode(category, message)))
        .path("/")
        .http_only(true)
        .build();
    let mut response = redirect(location);
    if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn flash_round_trips_through_jar() {
        let jar = set_flash(CookieJar::new(), "success", "File uploaded successfully!");
        let (_jar, flash) = take_flash(jar);
        assert_eq!(
            flash,
            Some(Flash::new("success", "File uploaded successfully!"))
        );
    }

    #[test]
    fn take_flash_on_empty_jar_is_none() {
        let (_jar, flash) = take_flash(CookieJar::new());
        assert!(flash.is_none());
    }

    #[test]
    fn flash_redirect_sets_location_and_cookie() {
        let response = flash_redirect("/login", "danger", "Please log in to continue.");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login"
        );
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with(crate::config::FLASH_COOKIE_NAME));
    }
}
