//! Gallery image repository

use crate::db::{with_pool, DynDatabasePool};
use crate::models::BloggImage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait BloggImageRepository: Send + Sync {
    /// Images of a post ordered by their sort order
    async fn list_by_blogg(&self, blogg_id: i64) -> Result<Vec<BloggImage>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<BloggImage>>;

    /// Highest sort order used within a post, `None` when it has no images
    async fn max_order(&self, blogg_id: i64) -> Result<Option<i32>>;

    async fn create(&self, blogg_id: i64, file_path: &str, order: i32) -> Result<BloggImage>;

    /// Move an image of `blogg_id` to `order`; images of other posts are untouched
    async fn set_order(&self, id: i64, blogg_id: i64, order: i32) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Remove every image row of a post
    async fn delete_by_blogg(&self, blogg_id: i64) -> Result<u64>;
}

pub struct SqlxBloggImageRepository {
    pool: DynDatabasePool,
}

impl SqlxBloggImageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BloggImageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BloggImageRepository for SqlxBloggImageRepository {
    async fn list_by_blogg(&self, blogg_id: i64) -> Result<Vec<BloggImage>> {
        let sql = r#"
            SELECT id, blogg_id, file_path, sort_order FROM blogg_images
            WHERE blogg_id = $1
            ORDER BY sort_order, id
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, BloggImage>(sql)
                .bind(blogg_id)
                .fetch_all(conn)
                .await
                .context("Failed to list images")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BloggImage>> {
        let sql = "SELECT id, blogg_id, file_path, sort_order FROM blogg_images WHERE id = $1";
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, BloggImage>(sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get image")
        })
    }

    async fn max_order(&self, blogg_id: i64) -> Result<Option<i32>> {
        let sql = "SELECT MAX(sort_order) FROM blogg_images WHERE blogg_id = $1";
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, Option<i32>>(sql)
                .bind(blogg_id)
                .fetch_one(conn)
                .await
                .context("Failed to get max image order")
        })
    }

    async fn create(&self, blogg_id: i64, file_path: &str, order: i32) -> Result<BloggImage> {
        let sql = r#"
            INSERT INTO blogg_images (blogg_id, file_path, sort_order)
            VALUES ($1, $2, $3)
            RETURNING id, blogg_id, file_path, sort_order
        "#;
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, BloggImage>(sql)
                .bind(blogg_id)
                .bind(file_path)
                .bind(order)
                .fetch_one(conn)
                .await
                .context("Failed to create image")
        })
    }

    async fn set_order(&self, id: i64, blogg_id: i64, order: i32) -> Result<bool> {
        let sql = "UPDATE blogg_images SET sort_order = $1 WHERE id = $2 AND blogg_id = $3";
        with_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(order)
                .bind(id)
                .bind(blogg_id)
                .execute(conn)
                .await
                .context("Failed to update image order")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM blogg_images WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete image")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn delete_by_blogg(&self, blogg_id: i64) -> Result<u64> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM blogg_images WHERE blogg_id = $1")
                .bind(blogg_id)
                .execute(conn)
                .await
                .context("Failed to delete images")
                .map(|r| r.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::blogg::tests::sample_blogg;
    use crate::db::repositories::blogg::{BloggRepository, SqlxBloggRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SqlxBloggImageRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let bloggs = SqlxBloggRepository::new(pool.clone());
        let a = bloggs.create(&sample_blogg("a")).await.unwrap().id;
        let b = bloggs.create(&sample_blogg("b")).await.unwrap().id;
        (SqlxBloggImageRepository::new(pool), a, b)
    }

    #[tokio::test]
    async fn test_create_and_order() {
        let (repo, blogg, _) = setup().await;
        assert_eq!(repo.max_order(blogg).await.unwrap(), None);

        let first = repo.create(blogg, "https://x/1.png", 0).await.unwrap();
        let second = repo.create(blogg, "https://x/2.png", 1).await.unwrap();
        assert_eq!(repo.max_order(blogg).await.unwrap(), Some(1));

        assert!(repo.set_order(second.id, blogg, 0).await.unwrap());
        assert!(repo.set_order(first.id, blogg, 1).await.unwrap());

        let ids: Vec<i64> = repo
            .list_by_blogg(blogg)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_set_order_ignores_other_posts() {
        let (repo, a, b) = setup().await;
        let image = repo.create(a, "https://x/1.png", 0).await.unwrap();

        assert!(!repo.set_order(image.id, b, 5).await.unwrap());
        assert_eq!(repo.get_by_id(image.id).await.unwrap().unwrap().order, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (repo, a, b) = setup().await;
        let image = repo.create(a, "https://x/1.png", 0).await.unwrap();
        repo.create(a, "https://x/2.png", 1).await.unwrap();
        repo.create(b, "https://x/3.png", 0).await.unwrap();

        assert!(repo.delete(image.id).await.unwrap());
        assert!(repo.get_by_id(image.id).await.unwrap().is_none());

        assert_eq!(repo.delete_by_blogg(a).await.unwrap(), 1);
        assert_eq!(repo.list_by_blogg(b).await.unwrap().len(), 1);
    }
}
