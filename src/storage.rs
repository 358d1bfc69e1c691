use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};

use crate::config::ALLOWED_EXTENSIONS;

/// Filesystem blob store rooted at the uploads directory, with one
/// subdirectory per username.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Creates the per-user directory if needed and returns it.
    pub async fn ensure_user_dir(&self, username: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(safe_component(username)?);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Resolves `<root>/<username>/<filename>`, rejecting anything that is
    /// not a single plain path component on either side.
    pub fn user_file_path(&self, username: &str, filename: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(safe_component(username)?)
            .join(safe_component(filename)?))
    }

    /// Writes a blob into the user's directory and returns its full path.
    pub async fn write_blob(
        &self,
        username: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.ensure_user_dir(username).await?;
        let target = self.user_file_path(username, filename)?;
        fs::write(&target, data).await?;
        Ok(target)
    }

    /// Opens a stored blob along with its size in bytes.
    pub async fn open_blob(&self, path: &Path) -> Result<(File, u64), StorageError> {
        self.ensure_contained(path)?;
        let metadata = fs::metadata(path).await?;
        let file = File::open(path).await?;
        Ok((file, metadata.len()))
    }

    pub async fn blob_exists(&self, path: &Path) -> bool {
        self.ensure_contained(path).is_ok() && fs::metadata(path).await.is_ok()
    }

    pub async fn remove_blob(&self, path: &Path) -> Result<(), StorageError> {
        self.ensure_contained(path)?;
        fs::remove_file(path).await?;
        Ok(())
    }

    fn ensure_contained(&self, path: &Path) -> Result<(), StorageError> {
        path.strip_prefix(&self.root)
            .map(|_| ())
            .map_err(|_| StorageError::InvalidName)
    }
}

/// Accepts only a single normal path component, so neither usernames nor
/// stored filenames can escape the uploads tree.
fn safe_component(value: &str) -> Result<&str, StorageError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment.to_str() == Some(value) => Ok(value),
        _ => Err(StorageError::InvalidName),
    }
}

/// Reduces an uploaded filename to a safe single component: the final path
/// segment with anything outside `[A-Za-z0-9._-]` replaced by underscores.
/// Returns `None` when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| matches!(c, '.' | '_')) {
        return None;
    }
    Some(cleaned)
}

/// Whether a username can double as a directory name under the uploads
/// root. Checked at registration so every later path join is safe.
pub fn is_safe_username(value: &str) -> bool {
    safe_component(value).is_ok()
}

/// Extension allow-list check, case-insensitive, requiring a dot.
pub fn has_allowed_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
