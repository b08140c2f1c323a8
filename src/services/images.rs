//! Post galleries and editor uploads
//!
//! Gallery images belong to a post and carry a sort order. Editor uploads are
//! images embedded in a post body by the rich-text editor; they are stored but
//! not tracked in the database.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use crate::db::repositories::{BloggImageRepository, BloggRepository};
use crate::models::{BloggImage, ImageOrderEntry};
use crate::services::blogg::BLOGG_FOLDER;
use crate::services::storage::{upload_lock, FileStorage, StorageError};

/// Storage folder for editor uploads without a post
pub const EDITOR_FOLDER: &str = "editor";

const MB: usize = 1024 * 1024;
const GALLERY_MAX_BYTES: usize = 20 * MB;
const EDITOR_MAX_BYTES: usize = 10 * MB;

const GALLERY_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];
const GALLERY_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];
const EDITOR_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
const EDITOR_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// A file received in a multipart upload
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    fn has_extension(&self, allowed: &[&str]) -> bool {
        self.extension().is_some_and(|e| allowed.contains(&e.as_str()))
    }

    fn has_mime_type(&self, allowed: &[&str]) -> bool {
        let content_type = self.content_type.trim().to_lowercase();
        allowed.contains(&content_type.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Fel vid uppladdning: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct ImageService {
    bloggs: Arc<dyn BloggRepository>,
    images: Arc<dyn BloggImageRepository>,
    storage: Arc<dyn FileStorage>,
}

impl ImageService {
    pub fn new(
        bloggs: Arc<dyn BloggRepository>,
        images: Arc<dyn BloggImageRepository>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            bloggs,
            images,
            storage,
        }
    }

    /// Gallery of a post in display order
    pub async fn list_for_blogg(&self, blogg_id: i64) -> Result<Vec<BloggImage>, ImageServiceError> {
        Ok(self
            .images
            .list_by_blogg(blogg_id)
            .await
            .context("Failed to list images")?)
    }

    /// Add an image to the end of a post's gallery.
    pub async fn upload(&self, blogg_id: i64, file: UploadedFile) -> Result<BloggImage, ImageServiceError> {
        validate_gallery_image(&file)?;
        if self
            .bloggs
            .get_by_id(blogg_id)
            .await
            .context("Failed to load post")?
            .is_none()
        {
            return Err(ImageServiceError::BadRequest(format!(
                "Blogg med ID {blogg_id} finns inte."
            )));
        }

        let url = {
            let _guard = upload_lock().lock().await;
            self.storage
                .save_blogg_image(&file.bytes, &file.file_name, blogg_id, BLOGG_FOLDER)
                .await
                .map_err(|e| {
                    tracing::error!("Image upload for post {} failed: {}", blogg_id, e);
                    e
                })?
        };

        let order = self
            .images
            .max_order(blogg_id)
            .await
            .context("Failed to read image order")?
            .map_or(0, |max| max + 1);
        let image = self
            .images
            .create(blogg_id, &url, order)
            .await
            .context("Failed to save image")?;
        tracing::info!("Added image {} to post {}", image.id, blogg_id);
        Ok(image)
    }

    /// Give each listed image of the post its position in `entries`
    pub async fn reorder(&self, blogg_id: i64, entries: &[ImageOrderEntry]) -> Result<(), ImageServiceError> {
        if entries.is_empty() {
            return Err(ImageServiceError::BadRequest("Ingen bildlista mottogs.".into()));
        }
        for (index, entry) in entries.iter().enumerate() {
            self.images
                .set_order(entry.id, blogg_id, index as i32)
                .await
                .context("Failed to update image order")?;
        }
        Ok(())
    }

    /// Delete one image; a failed storage delete is only logged
    pub async fn delete(&self, id: i64) -> Result<(), ImageServiceError> {
        let image = self
            .images
            .get_by_id(id)
            .await
            .context("Failed to load image")?
            .ok_or_else(|| ImageServiceError::NotFound("Bild hittades inte.".into()))?;

        if let Err(e) = self.storage.delete_image(&image.file_path).await {
            tracing::warn!("Could not delete stored file of image {}: {}", id, e);
        }
        self.images.delete(id).await.context("Failed to delete image")?;
        Ok(())
    }

    /// Delete a post's image folder and all its image rows
    pub async fn delete_for_blogg(&self, blogg_id: i64) -> Result<(), ImageServiceError> {
        if let Err(e) = self.storage.delete_blogg_folder(blogg_id, BLOGG_FOLDER).await {
            tracing::warn!("Could not delete image folder of post {}: {}", blogg_id, e);
        }
        let removed = self
            .images
            .delete_by_blogg(blogg_id)
            .await
            .context("Failed to delete images")?;
        tracing::info!("Deleted {} images of post {}", removed, blogg_id);
        Ok(())
    }

    /// Store an image embedded in a post body; returns its url.
    ///
    /// With a positive `blogg_id` the file goes into the post's folder.
    pub async fn editor_upload(
        &self,
        file: UploadedFile,
        blogg_id: Option<i64>,
    ) -> Result<String, ImageServiceError> {
        validate_editor_image(&file)?;

        let _guard = upload_lock().lock().await;
        let url = match blogg_id.filter(|id| *id > 0) {
            Some(id) => {
                self.storage
                    .save_blogg_image(&file.bytes, &file.file_name, id, BLOGG_FOLDER)
                    .await?
            }
            None => {
                self.storage
                    .save_image(&file.bytes, &file.file_name, EDITOR_FOLDER)
                    .await?
            }
        };
        Ok(url)
    }
}

fn validate_gallery_image(file: &UploadedFile) -> Result<(), ImageServiceError> {
    if file.is_empty() {
        return Err(ImageServiceError::BadRequest("Ingen bild bifogad.".into()));
    }
    if !file.has_extension(&GALLERY_EXTENSIONS) {
        return Err(ImageServiceError::BadRequest(format!(
            "Endast .jpg, .jpeg, .png, .webp, .gif tillåts. Fil: {}",
            file.file_name
        )));
    }
    if !file.has_mime_type(&GALLERY_MIME_TYPES) {
        let content_type = file.content_type.trim().to_lowercase();
        if content_type == "image/heic" || content_type == "image/heif" {
            return Err(ImageServiceError::BadRequest(
                "HEIC/HEIF stöds inte. Välj JPEG/PNG/WebP (i iPhone: Kamera > Format > 'Mest kompatibel')."
                    .into(),
            ));
        }
        return Err(ImageServiceError::BadRequest(format!(
            "Ogiltig MIME-typ: {}. Fil: {}",
            file.content_type, file.file_name
        )));
    }
    if file.bytes.len() > GALLERY_MAX_BYTES {
        return Err(ImageServiceError::BadRequest(format!(
            "Filen är för stor ({} MB). Max 20 MB. Fil: {}",
            file.bytes.len() / MB,
            file.file_name
        )));
    }
    Ok(())
}

fn validate_editor_image(file: &UploadedFile) -> Result<(), ImageServiceError> {
    if file.is_empty() {
        return Err(ImageServiceError::BadRequest("Ingen fil bifogad.".into()));
    }
    if !file.has_extension(&EDITOR_EXTENSIONS) {
        return Err(ImageServiceError::BadRequest(
            "Endast .jpg, .jpeg, .png, .webp tillåts.".into(),
        ));
    }
    if !file.has_mime_type(&EDITOR_MIME_TYPES) {
        return Err(ImageServiceError::BadRequest(format!(
            "Ogiltig MIME-typ: {}",
            file.content_type
        )));
    }
    if file.bytes.len() > EDITOR_MAX_BYTES {
        return Err(ImageServiceError::BadRequest("Filen är för stor. Max 10 MB.".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalStorageConfig;
    use crate::db::repositories::blogg::tests::sample_blogg;
    use crate::db::repositories::{SqlxBloggImageRepository, SqlxBloggRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::storage::LocalFileStorage;
    use tempfile::TempDir;

    async fn setup() -> (ImageService, Arc<dyn BloggRepository>, TempDir) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalFileStorage::new(LocalStorageConfig {
            base_path: dir.path().to_path_buf(),
            base_url: "https://localhost:5003/media".into(),
            root_folder: "uploads".into(),
        }));
        let bloggs = SqlxBloggRepository::boxed(pool.clone());
        let service = ImageService::new(bloggs.clone(), SqlxBloggImageRepository::boxed(pool), storage);
        (service, bloggs, dir)
    }

    fn png(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[test]
    fn test_gallery_validation() {
        let err = |f: UploadedFile| match validate_gallery_image(&f) {
            Err(ImageServiceError::BadRequest(m)) => m,
            other => panic!("expected bad request, got {other:?}"),
        };

        assert_eq!(err(UploadedFile::default()), "Ingen bild bifogad.");
        assert!(err(png("bild.bmp")).starts_with("Endast .jpg"));
        assert!(err(UploadedFile {
            content_type: "image/heic".into(),
            ..png("iphone.jpg")
        })
        .starts_with("HEIC/HEIF"));
        assert!(err(UploadedFile {
            content_type: "text/plain".into(),
            ..png("a.png")
        })
        .starts_with("Ogiltig MIME-typ: text/plain"));
        assert!(err(UploadedFile {
            bytes: vec![0; GALLERY_MAX_BYTES + 1],
            ..png("stor.png")
        })
        .contains("Max 20 MB"));

        assert!(validate_gallery_image(&png("Semester.PNG")).is_ok());
        assert!(validate_gallery_image(&UploadedFile {
            content_type: "image/gif".into(),
            ..png("rolig.gif")
        })
        .is_ok());
    }

    #[test]
    fn test_editor_validation() {
        assert!(matches!(
            validate_editor_image(&UploadedFile::default()),
            Err(ImageServiceError::BadRequest(m)) if m == "Ingen fil bifogad."
        ));
        assert!(validate_editor_image(&UploadedFile {
            content_type: "image/gif".into(),
            ..png("a.gif")
        })
        .is_err());
        assert!(validate_editor_image(&UploadedFile {
            bytes: vec![0; EDITOR_MAX_BYTES + 1],
            ..png("a.png")
        })
        .is_err());
        assert!(validate_editor_image(&png("a.png")).is_ok());
    }

    #[tokio::test]
    async fn test_upload_appends_to_gallery() {
        let (service, bloggs, dir) = setup().await;
        let post = bloggs.create(&sample_blogg("Galleri")).await.unwrap();

        let first = service.upload(post.id, png("a.png")).await.unwrap();
        let second = service.upload(post.id, png("b.png")).await.unwrap();
        assert_eq!(first.order, 0);
        assert_eq!(second.order, 1);
        assert!(first
            .file_path
            .starts_with(&format!("https://localhost:5003/media/uploads/blogg/{}/", post.id)));
        assert!(dir.path().join(format!("uploads/blogg/{}", post.id)).is_dir());

        let err = service.upload(9999, png("c.png")).await.unwrap_err();
        assert!(matches!(err, ImageServiceError::BadRequest(m) if m == "Blogg med ID 9999 finns inte."));
    }

    #[tokio::test]
    async fn test_reorder() {
        let (service, bloggs, _dir) = setup().await;
        let post = bloggs.create(&sample_blogg("Ordning")).await.unwrap();
        let a = service.upload(post.id, png("a.png")).await.unwrap();
        let b = service.upload(post.id, png("b.png")).await.unwrap();

        let entries: Vec<ImageOrderEntry> =
            serde_json::from_value(serde_json::json!([{ "id": b.id }, { "id": a.id }])).unwrap();
        service.reorder(post.id, &entries).await.unwrap();

        let ids: Vec<i64> = service
            .list_for_blogg(post.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);

        let err = service.reorder(post.id, &[]).await.unwrap_err();
        assert!(matches!(err, ImageServiceError::BadRequest(m) if m == "Ingen bildlista mottogs."));
    }

    #[tokio::test]
    async fn test_delete_image_and_gallery() {
        let (service, bloggs, dir) = setup().await;
        let post = bloggs.create(&sample_blogg("Radera")).await.unwrap();
        let a = service.upload(post.id, png("a.png")).await.unwrap();
        service.upload(post.id, png("b.png")).await.unwrap();

        service.delete(a.id).await.unwrap();
        assert_eq!(service.list_for_blogg(post.id).await.unwrap().len(), 1);
        let err = service.delete(a.id).await.unwrap_err();
        assert!(matches!(err, ImageServiceError::NotFound(m) if m == "Bild hittades inte."));

        service.delete_for_blogg(post.id).await.unwrap();
        assert!(service.list_for_blogg(post.id).await.unwrap().is_empty());
        assert!(!dir.path().join(format!("uploads/blogg/{}", post.id)).exists());
    }

    #[tokio::test]
    async fn test_editor_upload_folders() {
        let (service, _bloggs, dir) = setup().await;

        let url = service.editor_upload(png("a.png"), None).await.unwrap();
        assert!(url.starts_with("https://localhost:5003/media/uploads/editor/"));

        let url = service.editor_upload(png("b.png"), Some(0)).await.unwrap();
        assert!(url.contains("/uploads/editor/"));

        let url = service.editor_upload(png("c.png"), Some(12)).await.unwrap();
        assert!(url.contains("/uploads/blogg/12/"));
        assert!(dir.path().join("uploads/blogg/12").is_dir());
    }
}
