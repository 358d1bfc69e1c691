//! Application error type and response conversions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::flash::flash_redirect;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum AppError {
    /// No session; send the user to the login form.
    Unauthenticated,
    /// Missing row, missing blob, or owner mismatch. All three render the
    /// same flash so callers cannot probe for file existence.
    NotFoundOrForbidden,
    BadRequest(String),
    Database(sqlx::Error),
    Io(std::io::Error),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated => {
                flash_redirect("/login", "danger", "Please log in to continue.")
            }
            AppError::NotFoundOrForbidden => {
                flash_redirect("/dashboard", "danger", "File not found or unauthorized!")
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Database(err) => {
                error!(%err, "database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::Io(err) => {
                error!(%err, "filesystem failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AppError::Internal(msg) => {
                error!(msg, "internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName => AppError::BadRequest("invalid file name".into()),
            StorageError::Io(err) => AppError::Io(err),
        }
    }
}
