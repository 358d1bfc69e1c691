//! Cloudbox server binary.
//!
//! A minimal multi-user file-hosting web application: users register, log
//! in, and upload/view/download/delete files scoped to their own account.
//! The main entry point builds the Axum router, opens the SQLite pool and
//! the uploads root, and runs the HTTP listener until shutdown.

mod auth;
mod config;
mod db;
mod error;
mod files;
mod flash;
mod forms;
mod logging;
mod pages;
mod password;
mod session;
mod storage;
mod upload;

use axum::Router;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::Args;
use crate::session::SessionStore;
use crate::storage::Storage;

/// Starts the Cloudbox server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.uploads_dir)));
    storage.ensure_root().await?;
    info!(uploads_dir = %args.uploads_dir, "uploads root ready");

    let pool = db::connect(&args.database_url)
        .await
        .map_err(std::io::Error::other)?;
    let sessions = Arc::new(SessionStore::new());

    let app = Router::new()
        .route("/", get(pages::landing))
        .route("/register", get(auth::register_form).post(auth::register))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/dashboard", get(files::dashboard))
        .route("/upload", get(upload::upload_form).post(upload::upload))
        .route("/delete/{file_id}", post(files::delete_file))
        .route("/view/{file_id}", get(files::view_file))
        .route("/download/{file_id}", get(files::download_file))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.split(',').next().unwrap_or("").trim().to_string());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(pool))
        .layer(Extension(storage))
        .layer(Extension(sessions));

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.http_port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting HTTP server at {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
}
