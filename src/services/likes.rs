//! Post likes

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::LikeRepository;
use crate::models::LikeDto;

#[derive(Debug, thiserror::Error)]
pub enum LikeServiceError {
    #[error("Like not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct LikeService {
    repo: Arc<dyn LikeRepository>,
}

impl LikeService {
    pub fn new(repo: Arc<dyn LikeRepository>) -> Self {
        Self { repo }
    }

    /// Like count of a post and whether `user_id` has liked it
    pub async fn status(&self, blogg_id: i64, user_id: Option<i64>) -> Result<LikeDto, LikeServiceError> {
        let count = self.repo.count(blogg_id).await.context("Failed to count likes")?;
        let liked = match user_id {
            Some(user_id) => self
                .repo
                .exists(blogg_id, user_id)
                .await
                .context("Failed to check like")?,
            None => false,
        };
        Ok(LikeDto {
            blogg_id,
            user_id: user_id.map(|id| id.to_string()),
            count,
            liked,
        })
    }

    /// Like a post; liking twice changes nothing. Returns the new count.
    pub async fn like(&self, blogg_id: i64, user_id: i64) -> Result<i64, LikeServiceError> {
        self.repo
            .add(blogg_id, user_id)
            .await
            .context("Failed to add like")?;
        Ok(self.repo.count(blogg_id).await.context("Failed to count likes")?)
    }

    /// Remove a like; returns the new count
    pub async fn unlike(&self, blogg_id: i64, user_id: i64) -> Result<i64, LikeServiceError> {
        if !self
            .repo
            .remove(blogg_id, user_id)
            .await
            .context("Failed to remove like")?
        {
            return Err(LikeServiceError::NotFound);
        }
        Ok(self.repo.count(blogg_id).await.context("Failed to count likes")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::blogg::tests::sample_blogg;
    use crate::db::repositories::{BloggRepository, SqlxBloggRepository, SqlxLikeRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUser;

    async fn setup() -> (LikeService, i64, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let blogg = SqlxBloggRepository::new(pool.clone())
            .create(&sample_blogg("Gillad"))
            .await
            .unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let mut ids = Vec::new();
        for name in ["anna", "bertil"] {
            let user = users
                .create(&NewUser {
                    username: name.into(),
                    email: format!("{name}@example.com"),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        (LikeService::new(SqlxLikeRepository::boxed(pool)), blogg.id, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_like_is_idempotent() {
        let (service, blogg, anna, bertil) = setup().await;

        assert_eq!(service.like(blogg, anna).await.unwrap(), 1);
        assert_eq!(service.like(blogg, anna).await.unwrap(), 1);
        assert_eq!(service.like(blogg, bertil).await.unwrap(), 2);

        let status = service.status(blogg, Some(anna)).await.unwrap();
        assert!(status.liked);
        assert_eq!(status.count, 2);
        assert_eq!(status.user_id, Some(anna.to_string()));
    }

    #[tokio::test]
    async fn test_anonymous_status() {
        let (service, blogg, anna, _) = setup().await;
        service.like(blogg, anna).await.unwrap();

        let status = service.status(blogg, None).await.unwrap();
        assert_eq!(status.count, 1);
        assert!(!status.liked);
        assert_eq!(status.user_id, None);
    }

    #[tokio::test]
    async fn test_unlike() {
        let (service, blogg, anna, _) = setup().await;
        service.like(blogg, anna).await.unwrap();

        assert_eq!(service.unlike(blogg, anna).await.unwrap(), 0);
        assert!(matches!(
            service.unlike(blogg, anna).await.unwrap_err(),
            LikeServiceError::NotFound
        ));
    }
}
