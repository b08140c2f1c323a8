//! Blog posts and their gallery images

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blog post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Blogg {
    pub id: i64,
    pub title: String,
    /// Sanitized HTML body
    pub content: String,
    pub author: String,
    pub launch_date: DateTime<Utc>,
    pub is_archived: bool,
    pub view_count: i32,
    pub hidden: bool,
    pub user_id: Option<i64>,
}

impl Blogg {
    /// Visible to readers: neither hidden nor archived
    pub fn is_public(&self) -> bool {
        !self.hidden && !self.is_archived
    }
}

/// Body of create and update requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BloggInput {
    /// Must match the route id on update
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    pub author: String,
    pub launch_date: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub view_count: Option<i32>,
    pub hidden: bool,
    pub user_id: Option<i64>,
}

/// A gallery image attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BloggImage {
    pub id: i64,
    pub blogg_id: i64,
    pub file_path: String,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
}

/// Entry of an image reorder request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOrderEntry {
    pub id: i64,
    #[serde(default)]
    pub blogg_id: Option<i64>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
}
