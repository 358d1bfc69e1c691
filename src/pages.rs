//! Minimal server-rendered HTML pages. No template engine; every page is a
//! small string built from escaped values.

use axum::response::Html;
use axum_extra::extract::CookieJar;

use crate::db::FileRecord;
use crate::flash::{Flash, take_flash};

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, flash: Option<&Flash>, body: &str) -> Html<String> {
    let notice = flash
        .map(|flash| {
            format!(
                r#"<p class="flash {}">{}</p>"#,
                escape_html(&flash.category),
                escape_html(&flash.message)
            )
        })
        .unwrap_or_default();
    Html(format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body>\n<h1>{}</h1>\n{}\n{}\n</body>\n</html>\n",
        escape_html(title),
        escape_html(title),
        notice,
        body
    ))
}

fn error_list(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let items: String = errors
        .iter()
        .map(|err| format!("<li>{}</li>", escape_html(err)))
        .collect();
    format!(r#"<ul class="errors">{items}</ul>"#)
}

pub fn landing_page(flash: Option<&Flash>) -> Html<String> {
    layout(
        "Welcome to Your Cloud",
        flash,
        r#"<p><a href="/login">Log in</a> or <a href="/register">register</a>.</p>"#,
    )
}

pub fn login_page(flash: Option<&Flash>, csrf_token: &str, errors: &[String]) -> Html<String> {
    let body = format!(
        r#"{}<form method="post" action="/login">
<input type="hidden" name="csrf_token" value="{}">
<label>Username <input name="username"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Log in</button>
</form>
<p><a href="/register">Need an account? Register</a></p>"#,
        error_list(errors),
        escape_html(csrf_token)
    );
    layout("Login", flash, &body)
}

pub fn register_page(flash: Option<&Flash>, csrf_token: &str, errors: &[String]) -> Html<String> {
    let body = format!(
        r#"{}<form method="post" action="/register">
<input type="hidden" name="csrf_token" value="{}">
<label>Username <input name="username"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Register</button>
</form>
<p><a href="/login">Already registered? Log in</a></p>"#,
        error_list(errors),
        escape_html(csrf_token)
    );
    layout("Register", flash, &body)
}

pub fn upload_page(flash: Option<&Flash>, csrf_token: &str, errors: &[String]) -> Html<String> {
    let body = format!(
        r#"{}<form method="post" action="/upload" enctype="multipart/form-data">
<input type="hidden" name="csrf_token" value="{}">
<label>File <input type="file" name="file"></label>
<button type="submit">Upload</button>
</form>
<p><a href="/dashboard">Back to dashboard</a></p>"#,
        error_list(errors),
        escape_html(csrf_token)
    );
    layout("Upload", flash, &body)
}

pub fn dashboard_page(
    flash: Option<&Flash>,
    csrf_token: &str,
    files: &[FileRecord],
) -> Html<String> {
    let rows: String = files
        .iter()
        .map(|file| {
            format!(
                r#"<li>{} <small>{}</small>
<a href="/view/{id}">view</a>
<a href="/download/{id}">download</a>
<form method="post" action="/delete/{id}">
<input type="hidden" name="csrf_token" value="{csrf}">
<button type="submit">delete</button>
</form></li>"#,
                escape_html(&file.filename),
                file.upload_date.format("%Y-%m-%d %H:%M:%S"),
                id = file.id,
                csrf = escape_html(csrf_token),
            )
        })
        .collect();
    let listing = if files.is_empty() {
        "<p>No files uploaded yet.</p>".to_string()
    } else {
        format!("<ul>{rows}</ul>")
    };
    let body = format!(
        r#"{listing}
<p><a href="/upload">Upload a file</a> | <a href="/logout">Log out</a></p>"#
    );
    layout("Dashboard", flash, &body)
}

/// GET `/` landing page, open to everyone.
pub async fn landing(jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, flash) = take_flash(jar);
    (jar, landing_page(flash.as_ref()))
}
