//! Server-side sessions keyed by a random cookie token.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::SESSION_COOKIE_NAME;
use crate::flash::flash_redirect;

/// In-memory token -> user id map. Sessions never expire; they live until
/// logout or process restart.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, i64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session for the user and returns its cookie token.
    pub async fn create(&self, user_id: i64) -> String {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().await;
        sessions.insert(token.clone(), user_id);
        token
    }

    pub async fn get(&self, token: &str) -> Option<i64> {
        let sessions = self.sessions.lock().await;
        sessions.get(token).copied()
    }

    pub async fn remove(&self, token: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token);
    }
}

/// The logged-in identity, threaded into each protected handler as an
/// extractor argument. Requests without a live session are redirected to
/// the login form with a flash notice.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: i64,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let rejection = || flash_redirect("/login", "danger", "Please log in to continue.");
        let Some(store) = parts.extensions.get::<Arc<SessionStore>>().cloned() else {
            return Err(rejection());
        };
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE_NAME)
            && let Some(user_id) = store.get(cookie.value()).await
        {
            return Ok(CurrentUser { user_id });
        }
        Err(rejection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode, header};

    #[tokio::test]
    async fn create_get_remove() {
        let store = SessionStore::new();
        let token = store.create(7).await;
        assert_eq!(store.get(&token).await, Some(7));

        store.remove(&token).await;
        assert_eq!(store.get(&token).await, None);
        assert_eq!(store.get("unknown").await, None);
    }

    #[tokio::test]
    async fn extractor_resolves_session_cookie() {
        let store = Arc::new(SessionStore::new());
        let token = store.create(42).await;

        let request = Request::builder()
            .uri("/dashboard")
            .header(header::COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
            .body(())
            .expect("request");
        let (mut parts, _body) = request.into_parts();
        parts.extensions.insert(store);

        let user = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .expect("extract");
        assert_eq!(user.user_id, 42);
    }

    #[tokio::test]
    async fn extractor_redirects_without_session() {
        let store = Arc::new(SessionStore::new());
        let request = Request::builder()
            .uri("/dashboard")
            .body(())
            .expect("request");
        let (mut parts, _body) = request.into_parts();
        parts.extensions.insert(store);

        let rejection = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .expect_err("must reject");
        assert_eq!(rejection.status(), StatusCode::FOUND);
        assert_eq!(rejection.headers().get(header::LOCATION).unwrap(), "/login");
    }
}
