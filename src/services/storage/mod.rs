//! Image storage
//!
//! `FileStorage` is implemented by:
//! - `LocalFileStorage`: files below a local directory, served by `/media`
//! - `GitHubFileStorage`: files committed to a GitHub repository through the
//!   Contents API and served from raw.githubusercontent.com
//!
//! The implementation is selected by `storage.mode` in the configuration.

mod github;
mod local;

pub use github::GitHubFileStorage;
pub use local::LocalFileStorage;
pub(crate) use local::safe_join;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageMode};

/// Storage failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API returned {status}: {body}")]
    GitHub { status: u16, body: String },
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store an image below `folder`; returns its public url
    async fn save_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        folder: &str,
    ) -> Result<String, StorageError>;

    /// Store an image below `folder/{blogg_id}`; returns its public url
    async fn save_blogg_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        blogg_id: i64,
        folder: &str,
    ) -> Result<String, StorageError>;

    /// Delete a previously stored image by its public url
    async fn delete_image(&self, url: &str) -> Result<(), StorageError>;

    /// Delete every file stored for a post
    async fn delete_blogg_folder(&self, blogg_id: i64, folder: &str) -> Result<(), StorageError>;
}

/// Build the storage selected by configuration
pub fn create_storage(config: &StorageConfig) -> Arc<dyn FileStorage> {
    tracing::info!("File storage: {:?}", config.mode);
    match config.mode {
        StorageMode::Local => Arc::new(LocalFileStorage::new(config.local.clone())),
        StorageMode::Github => Arc::new(GitHubFileStorage::new(config.github.clone())),
    }
}

/// Serializes uploads across the whole process.
///
/// Two commits to the same GitHub branch at once make the second one fail.
static UPLOAD_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn upload_lock() -> &'static Mutex<()> {
    &UPLOAD_LOCK
}

/// `{uuid}{ext}` for an uploaded file name; `.bin` when it has no extension
pub fn unique_file_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_else(|| ".bin".to_string());
    format!("{}{}", Uuid::new_v4().simple(), ext)
}

/// Join path segments with `/`, skipping empty ones and stray slashes
pub fn join_path<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
