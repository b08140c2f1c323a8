//! Blog post service
//!
//! Post bodies come from a rich-text editor and are sanitized before they are
//! stored. Creating a visible post announces it to subscribers; editing a post
//! removes uploaded images the new body no longer references; deleting a post
//! removes its image folder and image rows first.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

use crate::db::repositories::{BloggImageRepository, BloggRepository};
use crate::models::{Blogg, BloggInput};
use crate::services::notifier::NewPostNotifier;
use crate::services::sanitizer::{removed_uploaded_images, sanitize_html};
use crate::services::storage::FileStorage;

/// Storage folder holding post images
pub const BLOGG_FOLDER: &str = "blogg";

#[derive(Debug, thiserror::Error)]
pub enum BloggServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Blogg not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct BloggService {
    bloggs: Arc<dyn BloggRepository>,
    images: Arc<dyn BloggImageRepository>,
    storage: Arc<dyn FileStorage>,
    notifier: Option<Arc<NewPostNotifier>>,
}

impl BloggService {
    pub fn new(
        bloggs: Arc<dyn BloggRepository>,
        images: Arc<dyn BloggImageRepository>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            bloggs,
            images,
            storage,
            notifier: None,
        }
    }

    /// Announce new visible posts through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<NewPostNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// All posts, newest launch date first
    pub async fn list(&self) -> Result<Vec<Blogg>, BloggServiceError> {
        Ok(self.bloggs.list().await.context("Failed to list posts")?)
    }

    pub async fn get(&self, id: i64) -> Result<Blogg, BloggServiceError> {
        self.bloggs
            .get_by_id(id)
            .await
            .context("Failed to load post")?
            .ok_or(BloggServiceError::NotFound(id))
    }

    pub async fn create(&self, input: BloggInput) -> Result<Blogg, BloggServiceError> {
        let blogg = Blogg {
            id: 0,
            title: input.title,
            content: sanitize_html(&input.content),
            author: input.author,
            launch_date: input.launch_date.unwrap_or_else(Utc::now),
            is_archived: input.is_archived,
            view_count: input.view_count.unwrap_or(0),
            hidden: input.hidden,
            user_id: input.user_id,
        };
        let created = self.bloggs.create(&blogg).await.context("Failed to create post")?;
        tracing::info!("Created post {} '{}'", created.id, created.title);

        if created.is_public() {
            if let Some(notifier) = &self.notifier {
                notifier.spawn(created.id);
            }
        }
        Ok(created)
    }

    /// Replace a post. Uploaded images dropped from the body are deleted from storage.
    pub async fn update(&self, id: i64, input: BloggInput) -> Result<(), BloggServiceError> {
        if input.id.is_some_and(|body_id| body_id != id) {
            return Err(BloggServiceError::BadRequest("Id mismatch.".into()));
        }
        let existing = self.get(id).await?;

        let content = sanitize_html(&input.content);
        let removed = removed_uploaded_images(&existing.content, &content);

        let updated = Blogg {
            id,
            title: input.title,
            content,
            author: input.author,
            launch_date: input.launch_date.unwrap_or(existing.launch_date),
            is_archived: input.is_archived,
            view_count: input.view_count.unwrap_or(existing.view_count),
            hidden: input.hidden,
            user_id: input.user_id.or(existing.user_id),
        };
        if !self.bloggs.update(&updated).await.context("Failed to update post")? {
            return Err(BloggServiceError::NotFound(id));
        }

        for url in removed {
            match self.storage.delete_image(&url).await {
                Ok(()) => tracing::info!("Deleted image no longer used by post {}: {}", id, url),
                Err(e) => tracing::warn!("Could not delete image {} of post {}: {}", url, id, e),
            }
        }
        Ok(())
    }

    /// Flip the hidden flag; returns the new value
    pub async fn toggle_hidden(&self, id: i64) -> Result<bool, BloggServiceError> {
        let blogg = self.get(id).await?;
        let hidden = !blogg.hidden;
        if !self
            .bloggs
            .set_hidden(id, hidden)
            .await
            .context("Failed to update hidden flag")?
        {
            return Err(BloggServiceError::NotFound(id));
        }
        Ok(hidden)
    }

    /// Flip the archived flag; returns the new value
    pub async fn toggle_archived(&self, id: i64) -> Result<bool, BloggServiceError> {
        let blogg = self.get(id).await?;
        let archived = !blogg.is_archived;
        if !self
            .bloggs
            .set_archived(id, archived)
            .await
            .context("Failed to update archived flag")?
        {
            return Err(BloggServiceError::NotFound(id));
        }
        Ok(archived)
    }

    /// Delete the image folder, the image rows and then the post.
    pub async fn delete(&self, id: i64) -> Result<(), BloggServiceError> {
        self.get(id).await?;

        if let Err(e) = self.storage.delete_blogg_folder(id, BLOGG_FOLDER).await {
            tracing::warn!("Could not delete image folder of post {}: {}", id, e);
        }
        self.images
            .delete_by_blogg(id)
            .await
            .context("Failed to delete post images")?;
        if !self.bloggs.delete(id).await.context("Failed to delete post")? {
            return Err(BloggServiceError::NotFound(id));
        }
        tracing::info!("Deleted post {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalStorageConfig;
    use crate::db::repositories::{SqlxBloggImageRepository, SqlxBloggRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::storage::LocalFileStorage;
    use tempfile::TempDir;

    struct Harness {
        service: BloggService,
        images: Arc<dyn BloggImageRepository>,
        storage: Arc<dyn FileStorage>,
        dir: TempDir,
    }

    async fn harness() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new(LocalStorageConfig {
            base_path: dir.path().to_path_buf(),
            base_url: "https://localhost:5003/media".into(),
            root_folder: "uploads".into(),
        }));
        let images = SqlxBloggImageRepository::boxed(pool.clone());
        let service = BloggService::new(SqlxBloggRepository::boxed(pool), images.clone(), storage.clone());
        Harness {
            service,
            images,
            storage,
            dir,
        }
    }

    fn input(title: &str, content: &str) -> BloggInput {
        BloggInput {
            title: title.into(),
            content: content.into(),
            author: "Sara".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_sanitizes_content() {
        let h = harness().await;
        let created = h
            .service
            .create(input("Hej", "<p>Text<script>alert(1)</script></p>"))
            .await
            .unwrap();

        assert_eq!(created.content, "<p>Text</p>");
        assert_eq!(created.view_count, 0);
        assert_eq!(h.service.get(created.id).await.unwrap().title, "Hej");
    }

    #[tokio::test]
    async fn test_update_checks_id_and_existence() {
        let h = harness().await;
        let created = h.service.create(input("A", "<p>a</p>")).await.unwrap();

        let mismatch = BloggInput {
            id: Some(created.id + 1),
            ..input("B", "")
        };
        assert!(matches!(
            h.service.update(created.id, mismatch).await.unwrap_err(),
            BloggServiceError::BadRequest(_)
        ));
        assert!(matches!(
            h.service.update(999, input("B", "")).await.unwrap_err(),
            BloggServiceError::NotFound(999)
        ));

        let before = h.service.get(created.id).await.unwrap();
        h.service.update(created.id, input("B", "<p>b</p>")).await.unwrap();
        let updated = h.service.get(created.id).await.unwrap();
        assert_eq!(updated.title, "B");
        assert_eq!(updated.launch_date, before.launch_date);
    }

    #[tokio::test]
    async fn test_update_deletes_removed_uploads() {
        let h = harness().await;
        let kept = h.storage.save_blogg_image(b"1", "a.png", 1, BLOGG_FOLDER).await.unwrap();
        let dropped = h.storage.save_blogg_image(b"2", "b.png", 1, BLOGG_FOLDER).await.unwrap();
        let html = format!(r#"<p><img src="{kept}"><img src="{dropped}"></p>"#);
        let created = h.service.create(input("Bilder", &html)).await.unwrap();

        let edited = format!(r#"<p><img src="{kept}"></p>"#);
        h.service.update(created.id, input("Bilder", &edited)).await.unwrap();

        let folder = h.dir.path().join("uploads/blogg/1");
        let remaining: Vec<_> = std::fs::read_dir(folder).unwrap().collect();
        assert_eq!(remaining.len(), 1);
        assert!(kept.ends_with(
            remaining[0].as_ref().unwrap().file_name().to_str().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_toggles() {
        let h = harness().await;
        let created = h.service.create(input("T", "")).await.unwrap();

        assert!(h.service.toggle_hidden(created.id).await.unwrap());
        assert!(!h.service.toggle_hidden(created.id).await.unwrap());
        assert!(h.service.toggle_archived(created.id).await.unwrap());
        assert!(h.service.get(created.id).await.unwrap().is_archived);
        assert!(matches!(
            h.service.toggle_hidden(404).await.unwrap_err(),
            BloggServiceError::NotFound(404)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_folder_images_and_post() {
        let h = harness().await;
        let created = h.service.create(input("D", "")).await.unwrap();
        let url = h
            .storage
            .save_blogg_image(b"img", "x.jpg", created.id, BLOGG_FOLDER)
            .await
            .unwrap();
        h.images.create(created.id, &url, 0).await.unwrap();

        h.service.delete(created.id).await.unwrap();

        assert!(!h.dir.path().join(format!("uploads/blogg/{}", created.id)).exists());
        assert!(h.images.list_by_blogg(created.id).await.unwrap().is_empty());
        assert!(matches!(
            h.service.get(created.id).await.unwrap_err(),
            BloggServiceError::NotFound(_)
        ));
        assert!(h.service.delete(created.id).await.is_err());
    }
}
