//! Registration, login, and logout handlers.

use axum::Form;
use axum::extract::Extension;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::config::SESSION_COOKIE_NAME;
use crate::db;
use crate::error::AppError;
use crate::flash::{Flash, redirect, set_flash, take_flash};
use crate::forms::{
    CSRF_ERROR, LoginForm, RegisterForm, issue_csrf, validation_messages, verify_csrf,
};
use crate::pages;
use crate::password::{hash_password, verify_password};
use crate::session::SessionStore;
use crate::storage::{Storage, is_safe_username};

/// GET `/register`.
pub async fn register_form(jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = issue_csrf(jar);
    let page = pages::register_page(flash.as_ref(), &csrf, &[]);
    (jar, page)
}

/// POST `/register`: validate, hash, insert, create the user's blob
/// directory, then send the user to the login form.
pub async fn register(
    Extension(pool): Extension<SqlitePool>,
    Extension(storage): Extension<Arc<Storage>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if !verify_csrf(&jar, &form.csrf_token) {
        return Ok(render_register(jar, vec![CSRF_ERROR.into()]));
    }
    if let Err(errors) = form.validate() {
        return Ok(render_register(jar, validation_messages(&errors)));
    }
    if !is_safe_username(&form.username) {
        return Ok(render_register(
            jar,
            vec!["Username contains invalid characters".into()],
        ));
    }

    if db::find_user_by_username(&pool, &form.username)
        .await?
        .is_some()
    {
        let jar = set_flash(jar, "danger", "Username already exists!");
        return Ok((jar, redirect("/register")).into_response());
    }

    let password_hash = hash_password(&form.password);
    match db::insert_user(&pool, &form.username, &password_hash).await {
        Ok(user_id) => {
            storage.ensure_user_dir(&form.username).await?;
            info!(user_id, username = form.username, "registered user");
            let jar = set_flash(
                jar,
                "success",
                "Registration successful! You can now log in.",
            );
            Ok((jar, redirect("/login")).into_response())
        }
        // Lost a race against a concurrent registration of the same name;
        // the UNIQUE column turns it into the same user-visible outcome.
        Err(err) if db::is_unique_violation(&err) => {
            let jar = set_flash(jar, "danger", "Username already exists!");
            Ok((jar, redirect("/register")).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// GET `/login`.
pub async fn login_form(jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = issue_csrf(jar);
    let page = pages::login_page(flash.as_ref(), &csrf, &[]);
    (jar, page)
}

/// POST `/login`. Unknown usernames and wrong passwords produce the same
/// generic message.
pub async fn login(
    Extension(pool): Extension<SqlitePool>,
    Extension(sessions): Extension<Arc<SessionStore>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if !verify_csrf(&jar, &form.csrf_token) {
        return Ok(render_login(jar, vec![CSRF_ERROR.into()]));
    }
    if let Err(errors) = form.validate() {
        return Ok(render_login(jar, validation_messages(&errors)));
    }

    match db::find_user_by_username(&pool, &form.username).await? {
        Some(user) if verify_password(&user.password, &form.password) => {
            let token = sessions.create(user.id).await;
            let jar = jar.add(
                Cookie::build((SESSION_COOKIE_NAME, token))
                    .path("/")
                    .http_only(true)
                    .build(),
            );
            let jar = set_flash(jar, "success", "Login successful!");
            info!(user_id = user.id, username = user.username, "login");
            Ok((jar, redirect("/dashboard")).into_response())
        }
        _ => {
            warn!(username = form.username, "failed login");
            let (jar, csrf) = issue_csrf(jar);
            let flash = Flash::new("danger", "Invalid credentials!");
            let page = pages::login_page(Some(&flash), &csrf, &[]);
            Ok((jar, page).into_response())
        }
    }
}

/// GET `/logout`: drop the server-side session and clear the cookie.
pub async fn logout(
    Extension(sessions): Extension<Arc<SessionStore>>,
    jar: CookieJar,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        let token = cookie.value().to_string();
        sessions.remove(&token).await;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/").build());
    let jar = set_flash(jar, "success", "Logged out successfully!");
    (jar, redirect("/login")).into_response()
}

fn render_register(jar: CookieJar, errors: Vec<String>) -> Response {
    let (jar, csrf) = issue_csrf(jar);
    (jar, pages::register_page(None, &csrf, &errors)).into_response()
}

fn render_login(jar: CookieJar, errors: Vec<String>) -> Response {
    let (jar, csrf) = issue_csrf(jar);
    (jar, pages::login_page(None, &csrf, &errors)).into_response()
}
