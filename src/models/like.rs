//! Likes on blog posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's like of one post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BloggLike {
    pub id: i64,
    pub blogg_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Like state of a post as seen by one (possibly anonymous) user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeDto {
    pub blogg_id: i64,
    pub user_id: Option<String>,
    pub count: i64,
    pub liked: bool,
}
