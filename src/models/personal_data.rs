//! Personal data export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ExternalLogin;

/// Everything stored about one account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalData {
    pub data: BTreeMap<String, Option<String>>,
    pub roles: Vec<String>,
    pub logins: Vec<ExternalLogin>,
    pub comments_count: i64,
    pub likes_count: i64,
    pub comments: Vec<CommentPreview>,
    pub likes: Vec<LikePreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommentPreview {
    pub id: i64,
    pub blogg_id: i64,
    pub blogg_title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LikePreview {
    pub id: i64,
    pub blogg_id: i64,
    pub blogg_title: String,
    pub created_at: DateTime<Utc>,
}
