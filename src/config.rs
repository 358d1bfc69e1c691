//! CLI arguments and server configuration defaults.

use clap::Parser;

pub const SESSION_COOKIE_NAME: &str = "CLOUDBOX_SESSION";
pub const CSRF_COOKIE_NAME: &str = "cloudbox_csrf";
pub const FLASH_COOKIE_NAME: &str = "cloudbox_flash";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://cloud.db";
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";

/// File extensions accepted by the upload form.
pub const ALLOWED_EXTENSIONS: [&str; 8] = ["txt", "pdf", "png", "jpg", "jpeg", "gif", "mp4", "mkv"];

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "cloudbox", version, about = "Cloudbox file hosting server")]
pub struct Args {
    #[arg(
        short = 'b',
        long,
        env = "CLOUDBOX_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "CLOUDBOX_HTTP_PORT",
        default_value_t = 5000,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        short = 'd',
        long,
        env = "CLOUDBOX_DATABASE_URL",
        default_value = DEFAULT_DATABASE_URL,
        help = "SQLite connection string"
    )]
    pub database_url: String,
    #[arg(
        short = 'u',
        long,
        env = "CLOUDBOX_UPLOADS_DIR",
        default_value = DEFAULT_UPLOADS_DIR,
        help = "Root directory for uploaded files"
    )]
    pub uploads_dir: String,
}
