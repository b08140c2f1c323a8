//! Local disk storage for development

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::{join_path, unique_file_name, FileStorage, StorageError};
use crate::config::LocalStorageConfig;

/// Writes below `base_path/root_folder` and hands out `/media` urls
pub struct LocalFileStorage {
    config: LocalStorageConfig,
}

impl LocalFileStorage {
    pub fn new(config: LocalStorageConfig) -> Self {
        Self { config }
    }

    async fn write(&self, bytes: &[u8], file_name: &str, dir: &str) -> Result<String, StorageError> {
        let relative = join_path([
            self.config.root_folder.as_str(),
            dir,
            unique_file_name(file_name).as_str(),
        ]);
        let target = self.config.base_path.join(&relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        tracing::debug!("Stored {} ({} bytes)", target.display(), bytes.len());
        Ok(format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            relative
        ))
    }

    /// Path below the base directory for a stored url, if it is one of ours
    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = match url.find("/media/") {
            Some(idx) => &url[idx + "/media/".len()..],
            None if !url.starts_with("http://") && !url.starts_with("https://") => url,
            None => return None,
        };
        let relative = relative.split(['?', '#']).next().unwrap_or_default();
        let decoded = urlencoding::decode(relative).ok()?;
        safe_join(&self.config.base_path, decoded.trim_start_matches('/'))
    }
}

/// `base.join(relative)` unless `relative` escapes `base`
pub(crate) fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let is_plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !is_plain || relative.as_os_str().is_empty() {
        return None;
    }
    Some(base.join(relative))
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        self.write(bytes, file_name, folder).await
    }

    async fn save_blogg_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        blogg_id: i64,
        folder: &str,
    ) -> Result<String, StorageError> {
        let dir = join_path([folder, blogg_id.to_string().as_str()]);
        self.write(bytes, file_name, &dir).await
    }

    async fn delete_image(&self, url: &str) -> Result<(), StorageError> {
        let Some(path) = self.resolve(url) else {
            tracing::warn!("Not a local media url, nothing deleted: {}", url);
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("File to delete not found: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_blogg_folder(&self, blogg_id: i64, folder: &str) -> Result<(), StorageError> {
        let relative = join_path([
            self.config.root_folder.as_str(),
            folder,
            blogg_id.to_string().as_str(),
        ]);
        let dir = self.config.base_path.join(relative);

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!("Deleted folder {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Folder to delete not found: {}", dir.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
