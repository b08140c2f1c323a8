//! Forbidden word repository

use crate::db::{with_pool, DynDatabasePool};
use crate::models::ForbiddenWord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ForbiddenWordRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ForbiddenWord>>;

    async fn create(&self, word_pattern: &str) -> Result<ForbiddenWord>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxForbiddenWordRepository {
    pool: DynDatabasePool,
}

impl SqlxForbiddenWordRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ForbiddenWordRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ForbiddenWordRepository for SqlxForbiddenWordRepository {
    async fn list(&self) -> Result<Vec<ForbiddenWord>> {
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, ForbiddenWord>("SELECT id, word_pattern FROM forbidden_words ORDER BY id")
                .fetch_all(conn)
                .await
                .context("Failed to list forbidden words")
        })
    }

    async fn create(&self, word_pattern: &str) -> Result<ForbiddenWord> {
        let sql = "INSERT INTO forbidden_words (word_pattern) VALUES ($1) RETURNING id, word_pattern";
        with_pool!(self.pool, conn => {
            sqlx::query_as::<_, ForbiddenWord>(sql)
                .bind(word_pattern)
                .fetch_one(conn)
                .await
                .context("Failed to create forbidden word")
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM forbidden_words WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete forbidden word")
                .map(|r| r.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_crud() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxForbiddenWordRepository::new(pool);

        let word = repo.create("dum(t)?").await.unwrap();
        repo.create("fula").await.unwrap();

        let patterns: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.word_pattern)
            .collect();
        assert_eq!(patterns, vec!["dum(t)?", "fula"]);

        assert!(repo.delete(word.id).await.unwrap());
        assert!(!repo.delete(word.id).await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
