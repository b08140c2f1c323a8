//! Site content: the about page, contact messages and the forbidden-word list

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::{AboutMeRepository, ContactMeRepository, ForbiddenWordRepository};
use crate::models::{AboutMe, ContactMe, ContactMeInput, ForbiddenWord};
use crate::services::images::UploadedFile;
use crate::services::storage::{upload_lock, FileStorage, StorageError};

/// Storage folder for the about page image
pub const ABOUT_FOLDER: &str = "about";

#[derive(Debug, thiserror::Error)]
pub enum ContentServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Fel vid uppladdning: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// The single about page and its image
pub struct AboutMeService {
    repo: Arc<dyn AboutMeRepository>,
    storage: Arc<dyn FileStorage>,
}

impl AboutMeService {
    pub fn new(repo: Arc<dyn AboutMeRepository>, storage: Arc<dyn FileStorage>) -> Self {
        Self { repo, storage }
    }

    pub async fn get(&self) -> Result<Option<AboutMe>, ContentServiceError> {
        Ok(self.repo.get_first().await.context("Failed to load about page")?)
    }

    pub async fn create(&self, about: AboutMe) -> Result<AboutMe, ContentServiceError> {
        Ok(self
            .repo
            .create(&about)
            .await
            .context("Failed to create about page")?)
    }

    pub async fn update(&self, id: i64, about: AboutMe) -> Result<(), ContentServiceError> {
        let updated = AboutMe { id, ..about };
        if !self
            .repo
            .update(&updated)
            .await
            .context("Failed to update about page")?
        {
            return Err(ContentServiceError::NotFound(format!(
                "Ingen AboutMe med Id={id} hittades."
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete about page")? {
            return Err(ContentServiceError::NotFound(format!(
                "Ingen AboutMe med Id={id} hittades."
            )));
        }
        Ok(())
    }

    pub async fn image_url(&self) -> Result<Option<String>, ContentServiceError> {
        Ok(self.get().await?.and_then(|a| a.image))
    }

    /// Store a new image and point the about page at it.
    ///
    /// The previous image is deleted; without an about page an empty one is created.
    pub async fn replace_image(&self, file: UploadedFile) -> Result<String, ContentServiceError> {
        if file.is_empty() {
            return Err(ContentServiceError::BadRequest("Ingen bild bifogad.".into()));
        }
        let url = {
            let _guard = upload_lock().lock().await;
            self.storage
                .save_image(&file.bytes, &file.file_name, ABOUT_FOLDER)
                .await?
        };

        match self.get().await? {
            Some(about) => {
                if let Some(old) = about.image.as_deref().filter(|i| !i.trim().is_empty()) {
                    if let Err(e) = self.storage.delete_image(old).await {
                        tracing::warn!("Could not delete previous about image {}: {}", old, e);
                    }
                }
                self.repo
                    .set_image(about.id, Some(&url))
                    .await
                    .context("Failed to save about image")?;
            }
            None => {
                self.repo
                    .create(&AboutMe {
                        title: Some(String::new()),
                        content: Some(String::new()),
                        image: Some(url.clone()),
                        ..Default::default()
                    })
                    .await
                    .context("Failed to create about page")?;
            }
        }
        Ok(url)
    }

    pub async fn delete_image(&self) -> Result<(), ContentServiceError> {
        let Some(about) = self.get().await? else {
            return Ok(());
        };
        let Some(image) = about.image.filter(|i| !i.trim().is_empty()) else {
            return Ok(());
        };
        if let Err(e) = self.storage.delete_image(&image).await {
            tracing::warn!("Could not delete about image {}: {}", image, e);
        }
        self.repo
            .set_image(about.id, None)
            .await
            .context("Failed to clear about image")?;
        Ok(())
    }
}

/// Messages sent through the contact form
pub struct ContactMeService {
    repo: Arc<dyn ContactMeRepository>,
}

impl ContactMeService {
    pub fn new(repo: Arc<dyn ContactMeRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<ContactMe>, ContentServiceError> {
        Ok(self.repo.list().await.context("Failed to list messages")?)
    }

    pub async fn create(&self, input: ContactMeInput) -> Result<ContactMe, ContentServiceError> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(ContentServiceError::BadRequest(errors.join(" ")));
        }
        let created = self.repo.create(&input).await.context("Failed to save message")?;
        tracing::info!("Contact message {} received", created.id);
        Ok(created)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete message")? {
            return Err(ContentServiceError::NotFound(format!("Message {id} not found")));
        }
        Ok(())
    }
}

/// Patterns masked in comments
pub struct ForbiddenWordService {
    repo: Arc<dyn ForbiddenWordRepository>,
}

impl ForbiddenWordService {
    pub fn new(repo: Arc<dyn ForbiddenWordRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<ForbiddenWord>, ContentServiceError> {
        Ok(self.repo.list().await.context("Failed to list forbidden words")?)
    }

    pub async fn create(&self, pattern: &str) -> Result<ForbiddenWord, ContentServiceError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(ContentServiceError::BadRequest("WordPattern is required.".into()));
        }
        Ok(self
            .repo
            .create(pattern)
            .await
            .context("Failed to add forbidden word")?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentServiceError> {
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete forbidden word")?
        {
            return Err(ContentServiceError::NotFound(format!(
                "Forbidden word {id} not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalStorageConfig;
    use crate::db::repositories::{
        SqlxAboutMeRepository, SqlxContactMeRepository, SqlxForbiddenWordRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::storage::LocalFileStorage;
    use tempfile::TempDir;

    async fn pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    async fn about_service() -> (AboutMeService, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalFileStorage::new(LocalStorageConfig {
            base_path: dir.path().to_path_buf(),
            base_url: "https://localhost:5003/media".into(),
            root_folder: "uploads".into(),
        }));
        (
            AboutMeService::new(SqlxAboutMeRepository::boxed(pool().await), storage),
            dir,
        )
    }

    fn jpg() -> UploadedFile {
        UploadedFile {
            file_name: "sara.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    fn files_in(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("uploads/about"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_about_crud() {
        let (service, _dir) = about_service().await;
        assert!(service.get().await.unwrap().is_none());

        let created = service
            .create(AboutMe {
                title: Some("Om mig".into()),
                content: Some("<p>Hej</p>".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        service
            .update(
                created.id,
                AboutMe {
                    title: Some("Om Sara".into()),
                    ..created.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(service.get().await.unwrap().unwrap().title.as_deref(), Some("Om Sara"));

        let err = service.update(99, AboutMe::default()).await.unwrap_err();
        assert!(matches!(err, ContentServiceError::NotFound(m) if m == "Ingen AboutMe med Id=99 hittades."));

        service.delete(created.id).await.unwrap();
        assert!(service.delete(created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_image_upload_creates_page_and_replaces_old_file() {
        let (service, dir) = about_service().await;

        let first = service.replace_image(jpg()).await.unwrap();
        assert!(first.contains("/uploads/about/"));
        assert_eq!(service.image_url().await.unwrap(), Some(first.clone()));

        let second = service.replace_image(jpg()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(files_in(&dir), 1);

        service.delete_image().await.unwrap();
        assert_eq!(service.image_url().await.unwrap(), None);
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let (service, _dir) = about_service().await;
        let err = service.replace_image(UploadedFile::default()).await.unwrap_err();
        assert!(matches!(err, ContentServiceError::BadRequest(m) if m == "Ingen bild bifogad."));
        service.delete_image().await.unwrap();
    }

    #[tokio::test]
    async fn test_contact_messages() {
        let service = ContactMeService::new(SqlxContactMeRepository::boxed(pool().await));

        let err = service.create(ContactMeInput::default()).await.unwrap_err();
        assert!(matches!(err, ContentServiceError::BadRequest(m) if m.contains("Vänligen ange ditt namn.")));

        let created = service
            .create(ContactMeInput {
                name: "Anna".into(),
                email: "anna@example.com".into(),
                subject: "Hej".into(),
                message: "Tack för bloggen".into(),
            })
            .await
            .unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
        service.delete(created.id).await.unwrap();
        assert!(matches!(
            service.delete(created.id).await.unwrap_err(),
            ContentServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_forbidden_words() {
        let service = ForbiddenWordService::new(SqlxForbiddenWordRepository::boxed(pool().await));

        assert!(service.create("  ").await.is_err());
        let word = service.create(" idiot(er)? ").await.unwrap();
        assert_eq!(word.word_pattern, "idiot(er)?");
        assert_eq!(service.list().await.unwrap(), vec![word.clone()]);
        service.delete(word.id).await.unwrap();
        assert!(service.delete(word.id).await.is_err());
    }
}
