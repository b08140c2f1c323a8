//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub blogg_id: i64,
    /// Set when the comment was written by a signed-in user
    pub user_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Comment as posted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentInput {
    pub blogg_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub content: String,
}

/// Comment ready for display: censored, with the author's current name and top role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: i64,
    pub blogg_id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub top_role: Option<String>,
}

/// A comment's author as resolved from the accounts table
#[derive(Debug, Clone)]
pub struct CommentAuthor {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub top_role: Option<String>,
}
