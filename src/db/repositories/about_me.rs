//! About-Me repository

use crate::db::{with_pool, DynDatabasePool};
use crate::models::AboutMe;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const ABOUT_ME_COLUMNS: &str = "id, title, content, image, user_id";

#[async_trait]
pub trait AboutMeRepository: Send + Sync {
    /// The page with the lowest id, if any
    async fn get_first(&self) -> Result<Option<AboutMe>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<AboutMe>>;

    async fn create(&self, about: &AboutMe) -> Result<AboutMe>;

    async fn update(&self, about: &AboutMe) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn set_image(&self, id: i64, image: Option<&str>) -> Result<bool>;
}

pub struct SqlxAboutMeRepository {
    pool: DynDatabasePool,
}

impl SqlxAboutMeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AboutMeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AboutMeRepository for SqlxAboutMeRepository {
    async fn get_first(&self) -> Result<Option<AboutMe>> {
        let sql = format!("SELECT {ABOUT_ME_COLUMNS} FROM about_me ORDER BY id LIMIT 1");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, AboutMe>(&sql)
                .fetch_optional(conn)
                .await
                .context("Failed to get about me")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<AboutMe>> {
        let sql = format!("SELECT {ABOUT_ME_COLUMNS} FROM about_me WHERE id = $1");
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, AboutMe>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get about me by ID")
        })
    }

    async fn create(&self, about: &AboutMe) -> Result<AboutMe> {
        let sql = format!(
            "INSERT INTO about_me (title, content, image, user_id) VALUES ($1, $2, $3, $4) \
             RETURNING {ABOUT_ME_COLUMNS}"
        );
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, AboutMe>(&sql)
                .bind(&about.title)
                .bind(&about.content)
                .bind(&about.image)
                .bind(about.user_id)
                .fetch_one(conn)
                .await
                .context("Failed to create about me")
        })
    }

    async fn update(&self, about: &AboutMe) -> Result<bool> {
        let sql = "UPDATE about_me SET title = $1, content = $2, image = $3, user_id = $4 WHERE id = $5";
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&about.title)
                .bind(&about.content)
                .bind(&about.image)
                .bind(about.user_id)
                .bind(about.id)
                .execute(conn)
                .await
                .context("Failed to update about me")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM about_me WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete about me")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn set_image(&self, id: i64, image: Option<&str>) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("UPDATE about_me SET image = $1 WHERE id = $2")
                .bind(image)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to set about me image")
                .map(|r| r.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxAboutMeRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxAboutMeRepository::new(pool)
    }

    #[tokio::test]
    async fn test_first_is_lowest_id() {
        let repo = setup_test_repo().await;
        assert!(repo.get_first().await.unwrap().is_none());

        let first = repo
            .create(&AboutMe {
                title: Some("Om mig".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        repo.create(&AboutMe::default()).await.unwrap();

        assert_eq!(repo.get_first().await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_update_image_and_delete() {
        let repo = setup_test_repo().await;
        let mut about = repo.create(&AboutMe::default()).await.unwrap();

        about.content = Some("<p>Hej</p>".into());
        assert!(repo.update(&about).await.unwrap());
        assert!(repo.set_image(about.id, Some("https://x/me.png")).await.unwrap());

        let found = repo.get_by_id(about.id).await.unwrap().unwrap();
        assert_eq!(found.content.as_deref(), Some("<p>Hej</p>"));
        assert_eq!(found.image.as_deref(), Some("https://x/me.png"));

        assert!(repo.set_image(about.id, None).await.unwrap());
        assert!(repo.get_by_id(about.id).await.unwrap().unwrap().image.is_none());

        assert!(repo.delete(about.id).await.unwrap());
        assert!(!repo.update(&about).await.unwrap());
    }
}
