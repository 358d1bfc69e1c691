//! Dashboard listing, blob streaming, and delete handlers.

use axum::Form;
use axum::body::Body;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::db::{self, FileRecord};
use crate::error::AppError;
use crate::flash::{redirect, set_flash, take_flash};
use crate::forms::{CSRF_ERROR, issue_csrf, verify_csrf};
use crate::pages;
use crate::session::CurrentUser;
use crate::storage::{Storage, StorageError};

#[derive(Deserialize)]
pub(crate) struct DeleteForm {
    #[serde(default)]
    csrf_token: String,
}

/// GET `/dashboard`: the user's own files, insertion order.
pub async fn dashboard(
    user: CurrentUser,
    Extension(pool): Extension<SqlitePool>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), AppError> {
    let (jar, flash) = take_flash(jar);
    let (jar, csrf) = issue_csrf(jar);
    let files = db::list_files(&pool, user.user_id).await?;
    Ok((jar, pages::dashboard_page(flash.as_ref(), &csrf, &files)))
}

/// GET `/view/{file_id}`: stream the blob inline.
pub async fn view_file(
    user: CurrentUser,
    Extension(pool): Extension<SqlitePool>,
    Extension(storage): Extension<Arc<Storage>>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    let file = authorized_file(&pool, file_id, user.user_id).await?;
    stream_blob(&storage, &file, false).await
}

/// GET `/download/{file_id}`: stream the blob as an attachment.
pub async fn download_file(
    user: CurrentUser,
    Extension(pool): Extension<SqlitePool>,
    Extension(storage): Extension<Arc<Storage>>,
    Path(file_id): Path<i64>,
) -> Result<Response, AppError> {
    let file = authorized_file(&pool, file_id, user.user_id).await?;
    stream_blob(&storage, &file, true).await
}

/// POST `/delete/{file_id}`. The row goes first and the blob second, so an
/// interrupted delete can only leave an orphan blob, never a row pointing
/// at nothing.
pub async fn delete_file(
    user: CurrentUser,
    Extension(pool): Extension<SqlitePool>,
    Extension(storage): Extension<Arc<Storage>>,
    jar: CookieJar,
    Path(file_id): Path<i64>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, AppError> {
    if !verify_csrf(&jar, &form.csrf_token) {
        let jar = set_flash(jar, "danger", CSRF_ERROR);
        return Ok((jar, redirect("/dashboard")).into_response());
    }

    let file = authorized_file(&pool, file_id, user.user_id).await?;
    let blob_path = std::path::Path::new(&file.filepath);
    if !storage.blob_exists(blob_path).await {
        // Row without blob; leave it for manual reconciliation.
        return Err(AppError::NotFoundOrForbidden);
    }

    db::delete_file(&pool, file.id).await?;
    if let Err(err) = storage.remove_blob(blob_path).await {
        warn!(
            file_id,
            filepath = %file.filepath,
            error = ?err,
            "blob removal failed after row delete; orphan blob left behind"
        );
    }
    info!(file_id, user_id = user.user_id, "file deleted");

    let jar = set_flash(jar, "success", "File deleted successfully!");
    Ok((jar, redirect("/dashboard")).into_response())
}

/// Fetches a file row only when it exists and belongs to the session user.
/// Both failure modes collapse into the same rejection.
async fn authorized_file(
    pool: &SqlitePool,
    file_id: i64,
    user_id: i64,
) -> Result<FileRecord, AppError> {
    match db::find_file(pool, file_id).await? {
        Some(file) if file.user_id == user_id => Ok(file),
        _ => Err(AppError::NotFoundOrForbidden),
    }
}

async fn stream_blob(
    storage: &Storage,
    file: &FileRecord,
    attachment: bool,
) -> Result<Response, AppError> {
    let path = std::path::Path::new(&file.filepath);
    let (handle, size) = match storage.open_blob(path).await {
        Ok(opened) => opened,
        Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            warn!(file_id = file.id, filepath = %file.filepath, "blob missing on disk");
            return Err(AppError::NotFoundOrForbidden);
        }
        Err(err) => return Err(err.into()),
    };

    let mime = mime_guess::from_path(&file.filename).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| AppError::Internal("invalid mime type".into()))?,
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string())
            .map_err(|_| AppError::Internal("invalid header value".into()))?,
    );
    if attachment {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
                .map_err(|_| AppError::Internal("invalid header value".into()))?,
        );
    }

    info!(
        file_id = file.id,
        filename = %file.filename,
        size,
        attachment,
        "stream blob"
    );
    let stream = ReaderStream::new(handle);
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::User;
    use crate::upload::store_upload;
    use axum::body::to_bytes;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, Arc<Storage>, SqlitePool) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create uploads root");
        (temp, Arc::new(Storage::new(root)), db::memory_pool().await)
    }

    async fn add_user(pool: &SqlitePool, username: &str) -> User {
        let id = db::insert_user(pool, username, "hash").await.expect("user");
        db::find_user(pool, id).await.expect("query").expect("row")
    }

    fn delete_form(jar: &CookieJar) -> Form<DeleteForm> {
        let token = jar
            .get(crate::config::CSRF_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string())
            .unwrap_or_default();
        Form(DeleteForm { csrf_token: token })
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec()
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_bytes() {
        let (_temp, storage, pool) = setup().await;
        let alice = add_user(&pool, "alice").await;
        let file_id = store_upload(&pool, &storage, &alice, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");

        let response = download_file(
            CurrentUser { user_id: alice.id },
            Extension(pool.clone()),
            Extension(storage.clone()),
            Path(file_id),
        )
        .await
        .expect("download");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .unwrap(),
            r#"attachment; filename="notes.txt""#
        );
        assert_eq!(body_bytes(response).await, b"hello");

        let response = view_file(
            CurrentUser { user_id: alice.id },
            Extension(pool),
            Extension(storage),
            Path(file_id),
        )
        .await
        .expect("view");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
        assert_eq!(body_bytes(response).await, b"hello");
    }

    #[tokio::test]
    async fn other_users_files_are_invisible_and_unreachable() {
        let (_temp, storage, pool) = setup().await;
        let alice = add_user(&pool, "alice").await;
        let bob = add_user(&pool, "bob").await;
        let file_id = store_upload(&pool, &storage, &alice, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");

        assert!(
            db::list_files(&pool, bob.id)
                .await
                .expect("list")
                .is_empty()
        );

        let view = view_file(
            CurrentUser { user_id: bob.id },
            Extension(pool.clone()),
            Extension(storage.clone()),
            Path(file_id),
        )
        .await;
        assert!(matches!(view, Err(AppError::NotFoundOrForbidden)));

        let download = download_file(
            CurrentUser { user_id: bob.id },
            Extension(pool.clone()),
            Extension(storage.clone()),
            Path(file_id),
        )
        .await;
        assert!(matches!(download, Err(AppError::NotFoundOrForbidden)));

        let (jar, _token) = issue_csrf(CookieJar::new());
        let form = delete_form(&jar);
        let delete = delete_file(
            CurrentUser { user_id: bob.id },
            Extension(pool.clone()),
            Extension(storage.clone()),
            jar,
            Path(file_id),
            form,
        )
        .await;
        assert!(matches!(delete, Err(AppError::NotFoundOrForbidden)));
        assert!(
            db::find_file(&pool, file_id)
                .await
                .expect("query")
                .is_some(),
            "alice's row must survive bob's delete attempt"
        );
    }

    #[tokio::test]
    async fn delete_removes_row_and_blob() {
        let (_temp, storage, pool) = setup().await;
        let alice = add_user(&pool, "alice").await;
        let file_id = store_upload(&pool, &storage, &alice, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");
        let filepath = db::find_file(&pool, file_id)
            .await
            .expect("query")
            .expect("row")
            .filepath;

        let (jar, _token) = issue_csrf(CookieJar::new());
        let form = delete_form(&jar);
        let response = delete_file(
            CurrentUser { user_id: alice.id },
            Extension(pool.clone()),
            Extension(storage.clone()),
            jar,
            Path(file_id),
            form,
        )
        .await
        .expect("delete");
        assert_eq!(response.status(), StatusCode::FOUND);

        assert!(db::find_file(&pool, file_id).await.expect("query").is_none());
        assert!(!std::path::Path::new(&filepath).exists());
        assert!(
            db::list_files(&pool, alice.id)
                .await
                .expect("list")
                .is_empty()
        );

        let view = view_file(
            CurrentUser { user_id: alice.id },
            Extension(pool),
            Extension(storage),
            Path(file_id),
        )
        .await;
        assert!(matches!(view, Err(AppError::NotFoundOrForbidden)));
    }

    #[tokio::test]
    async fn delete_with_missing_blob_leaves_row_intact() {
        let (_temp, storage, pool) = setup().await;
        let alice = add_user(&pool, "alice").await;
        let file_id = store_upload(&pool, &storage, &alice, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");
        let filepath = db::find_file(&pool, file_id)
            .await
            .expect("query")
            .expect("row")
            .filepath;
        std::fs::remove_file(&filepath).expect("drop blob behind the app's back");

        let (jar, _token) = issue_csrf(CookieJar::new());
        let form = delete_form(&jar);
        let result = delete_file(
            CurrentUser { user_id: alice.id },
            Extension(pool.clone()),
            Extension(storage),
            jar,
            Path(file_id),
            form,
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFoundOrForbidden)));
        assert!(
            db::find_file(&pool, file_id)
                .await
                .expect("query")
                .is_some()
        );
    }

    #[tokio::test]
    async fn view_with_missing_blob_flashes_instead_of_erroring() {
        let (_temp, storage, pool) = setup().await;
        let alice = add_user(&pool, "alice").await;
        let file_id = store_upload(&pool, &storage, &alice, "notes.txt", b"hello")
            .await
            .ok()
            .expect("upload");
        let filepath = db::find_file(&pool, file_id)
            .await
            .expect("query")
            .expect("row")
            .filepath;
        std::fs::remove_file(&filepath).expect("drop blob");

        let result = view_file(
            CurrentUser { user_id: alice.id },
            Extension(pool.clone()),
            Extension(storage),
            Path(file_id),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFoundOrForbidden)));
        assert!(
            db::find_file(&pool, file_id)
                .await
                .expect("query")
                .is_some(),
            "no automatic cleanup of the dangling row"
        );
    }
}
