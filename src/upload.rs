//! Upload form and multipart upload handler.

use axum::extract::{Extension, Multipart};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{self, User};
use crate::error::AppError;
use crate::flash::{Flash, redirect, set_flash, take_flash};
use crate::forms::{CSRF_ERROR, issue_csrf, verify_csrf};
use crate::pages;
use crate::session::CurrentUser;
use crate::storage::{Storage, has_allowed_extension, sanitize_file_name};

pub enum UploadError {
    /// Rejected by the extension allow-list or unusable after
    /// sanitization.
    InvalidType,
    App(AppError),
}

/// GET `/upload`.
pub async fn upload_form(_user: CurrentUser, jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = issue_csrf(jar);
    let page = pages::upload_page(flash.as_ref(), &csrf, &[]);
    (jar, page)
}

/// POST `/upload`: one required file field plus the CSRF token.
pub async fn upload(
    user: CurrentUser,
    Extension(pool): Extension<SqlitePool>,
    Extension(storage): Extension<Arc<Storage>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut csrf_token = String::new();
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("csrf_token") => {
                csrf_token = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
            }
            Some("file") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
                upload = Some((original, data.to_vec()));
            }
            _ => {}
        }
    }

    if !verify_csrf(&jar, &csrf_token) {
        return Ok(render_upload(jar, None, vec![CSRF_ERROR.into()]));
    }
    let Some((original_name, data)) = upload.filter(|(name, _)| !name.is_empty()) else {
        return Ok(render_upload(jar, None, vec!["File is required".into()]));
    };
    let Some(owner) = db::find_user(&pool, user.user_id).await? else {
        // session survived its account; treat like a missing login
        return Err(AppError::Unauthenticated);
    };

    match store_upload(&pool, &storage, &owner, &original_name, &data).await {
        Ok(file_id) => {
            info!(
                file_id,
                user_id = owner.id,
                filename = original_name,
                size = data.len(),
                "file uploaded"
            );
            let jar = set_flash(jar, "success", "File uploaded successfully!");
            Ok((jar, redirect("/dashboard")).into_response())
        }
        Err(UploadError::InvalidType) => {
            let flash = Flash::new("danger", "Invalid file type!");
            Ok(render_upload(jar, Some(flash), Vec::new()))
        }
        Err(UploadError::App(err)) => Err(err),
    }
}

/// Writes the blob, then records the row. If the insert fails, a blob
/// this upload created is removed again so no orphan can appear under the
/// uploads root. A blob that already existed (same-name re-upload) is left
/// in place instead, because earlier rows still point at that path.
pub async fn store_upload(
    pool: &SqlitePool,
    storage: &Storage,
    owner: &User,
    original_name: &str,
    data: &[u8],
) -> Result<i64, UploadError> {
    let Some(filename) = sanitize_file_name(original_name) else {
        return Err(UploadError::InvalidType);
    };
    if !has_allowed_extension(&filename) {
        return Err(UploadError::InvalidType);
    }

    let target = storage
        .user_file_path(&owner.username, &filename)
        .map_err(|err| UploadError::App(err.into()))?;
    let preexisting = storage.blob_exists(&target).await;
    let path = storage
        .write_blob(&owner.username, &filename, data)
        .await
        .map_err(|err| UploadError::App(err.into()))?;
    match db::insert_file(pool, &filename, &path.to_string_lossy(), owner.id).await {
        Ok(file_id) => Ok(file_id),
        Err(err) => {
            if preexisting {
                warn!(
                    filename,
                    "insert failed after overwriting an existing blob; keeping it for earlier rows"
                );
            } else if let Err(cleanup) = storage.remove_blob(&path).await {
                warn!(
                    filename,
                    error = ?cleanup,
                    "failed to remove blob after insert failure"
                );
            }
            Err(UploadError::App(err.into()))
        }
    }
}

fn render_upload(jar: CookieJar, flash: Option<Flash>, errors: Vec<String>) -> Response {
    let (jar, csrf) = issue_csrf(jar);
    (jar, pages::upload_page(flash.as_ref(), &csrf, &errors)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, Storage, SqlitePool, User) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create uploads root");
        let storage = Storage::new(root);
        let pool = db::memory_pool().await;
        let user_id = db::insert_user(&pool, "alice", "hash").await.expect("user");
        let owner = db::find_user(&pool, user_id)
            .await
            .expect("query")
            .expect("row");
        (temp, storage, pool, owner)
    }

    #[tokio::test]
    async fn stores_blob_and_row() {
        let (_temp, storage, pool, owner) = setup().await;
        let file_id = store_upload(&pool, &storage, &owner, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");

        let record = db::find_file(&pool, file_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(record.filename, "notes.txt");
        assert_eq!(record.user_id, owner.id);
        assert_eq!(
            std::fs::read(&record.filepath).expect("blob"),
            b"hello"
        );
    }

    #[tokio::test]
    async fn sanitizes_traversal_names() {
        let (_temp, storage, pool, owner) = setup().await;
        let file_id = store_upload(&pool, &storage, &owner, "../../escape.txt", b"x")
            .await
            .ok()
            .expect("upload");

        let record = db::find_file(&pool, file_id)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(record.filename, "escape.txt");
        assert!(
            std::path::Path::new(&record.filepath).starts_with(storage.root_path()),
            "blob must stay under the uploads root"
        );
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let (_temp, storage, pool, owner) = setup().await;
        let result = store_upload(&pool, &storage, &owner, "malware.exe", b"x").await;
        assert!(matches!(result, Err(UploadError::InvalidType)));
        assert!(
            db::list_files(&pool, owner.id)
                .await
                .expect("list")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rejects_extensionless_name() {
        let (_temp, storage, pool, owner) = setup().await;
        let result = store_upload(&pool, &storage, &owner, "README", b"x").await;
        assert!(matches!(result, Err(UploadError::InvalidType)));
    }

    #[tokio::test]
    async fn same_name_overwrites_blob_and_adds_second_row() {
        let (_temp, storage, pool, owner) = setup().await;
        let first = store_upload(&pool, &storage, &owner, "notes.txt", b"old")
            .await
            .ok()
            .expect("upload");
        let second = store_upload(&pool, &storage, &owner, "notes.txt", b"new")
            .await
            .ok()
            .expect("upload");
        assert_ne!(first, second);

        let records = db::list_files(&pool, owner.id).await.expect("list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filepath, records[1].filepath);
        assert_eq!(
            std::fs::read(&records[0].filepath).expect("blob"),
            b"new"
        );
    }

    #[tokio::test]
    async fn insert_failure_keeps_overwritten_blob() {
        let (_temp, storage, pool, owner) = setup().await;
        let first = store_upload(&pool, &storage, &owner, "notes.txt", b"old")
            .await
            .ok()
            .expect("upload");
        let record = db::find_file(&pool, first)
            .await
            .expect("query")
            .expect("row");

        sqlx::query("DROP TABLE files")
            .execute(&pool)
            .await
            .expect("drop");
        let result = store_upload(&pool, &storage, &owner, "notes.txt", b"new").await;
        assert!(matches!(result, Err(UploadError::App(_))));
        // The first row still points at this path, so it must survive.
        assert_eq!(
            std::fs::read(&record.filepath).expect("blob"),
            b"new"
        );
    }

    #[tokio::test]
    async fn insert_failure_removes_fresh_blob() {
        let (_temp, storage, pool, owner) = setup().await;
        sqlx::query("DROP TABLE files")
            .execute(&pool)
            .await
            .expect("drop");
        let result = store_upload(&pool, &storage, &owner, "notes.txt", b"x").await;
        assert!(matches!(result, Err(UploadError::App(_))));

        let target = storage
            .user_file_path(&owner.username, "notes.txt")
            .expect("path");
        assert!(!storage.blob_exists(&target).await);
    }
}
