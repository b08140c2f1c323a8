//! Comment service
//!
//! Comments are shown with the current username and best role of their author
//! and with forbidden words masked. New comments must pass the content safety
//! check; comments written while signed in are tied to the account.

use anyhow::Context;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::repositories::{CommentRepository, ForbiddenWordRepository, NewComment, UserRepository};
use crate::models::{Comment, CommentAuthor, CommentDto, CommentInput, Policy, Role};
use crate::services::censorship::{build_censor_regex, censor_with};
use crate::services::content_safety::ContentSafetyService;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Comment not found: {0}")]
    NotFound(i64),

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// The signed-in user acting on a comment
#[derive(Debug, Clone)]
pub struct CommentActor {
    pub user_id: i64,
    pub roles: Vec<String>,
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    users: Arc<dyn UserRepository>,
    forbidden_words: Arc<dyn ForbiddenWordRepository>,
    safety: Arc<ContentSafetyService>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        users: Arc<dyn UserRepository>,
        forbidden_words: Arc<dyn ForbiddenWordRepository>,
        safety: Arc<ContentSafetyService>,
    ) -> Self {
        Self {
            comments,
            users,
            forbidden_words,
            safety,
        }
    }

    pub async fn list(&self) -> Result<Vec<CommentDto>, CommentServiceError> {
        let comments = self.comments.list().await.context("Failed to list comments")?;
        self.to_dtos(comments).await
    }

    /// Comments of a post, oldest first
    pub async fn list_by_blogg(&self, blogg_id: i64) -> Result<Vec<CommentDto>, CommentServiceError> {
        let comments = self
            .comments
            .list_by_blogg(blogg_id)
            .await
            .context("Failed to list comments")?;
        self.to_dtos(comments).await
    }

    pub async fn get(&self, id: i64) -> Result<CommentDto, CommentServiceError> {
        let comment = self
            .comments
            .get_by_id(id)
            .await
            .context("Failed to load comment")?
            .ok_or(CommentServiceError::NotFound(id))?;
        let mut dtos = self.to_dtos(vec![comment]).await?;
        dtos.pop().ok_or(CommentServiceError::NotFound(id))
    }

    /// Publish a comment. A signed-in author is linked by id, email and username;
    /// anonymous comments never keep an email.
    pub async fn create(
        &self,
        input: CommentInput,
        author_id: Option<i64>,
    ) -> Result<CommentDto, CommentServiceError> {
        if input.content.trim().is_empty() {
            return Err(CommentServiceError::BadRequest("Kommentaren får inte vara tom.".into()));
        }
        if !input.name.trim().is_empty() && !self.safety.is_safe(&input.name).await {
            return Err(CommentServiceError::BadRequest(
                "Namnet innehåller otillåtet språk.".into(),
            ));
        }
        if !self.safety.is_safe(&input.content).await {
            return Err(CommentServiceError::BadRequest(
                "Kommentaren bedömdes som osäker och kan inte publiceras.".into(),
            ));
        }

        let author = match author_id {
            Some(id) => self.users.get_by_id(id).await.context("Failed to load author")?,
            None => None,
        };
        let new_comment = match author {
            Some(user) => NewComment {
                blogg_id: input.blogg_id,
                user_id: Some(user.id),
                name: user.username,
                email: Some(user.email),
                content: input.content,
            },
            None => NewComment {
                blogg_id: input.blogg_id,
                user_id: None,
                name: input.name.trim().to_string(),
                email: None,
                content: input.content,
            },
        };

        let created = self
            .comments
            .create(&new_comment)
            .await
            .context("Failed to create comment")?;
        tracing::info!("Comment {} added to post {}", created.id, created.blogg_id);
        self.get(created.id).await
    }

    /// Delete a comment as its owner or as a moderator.
    pub async fn delete(&self, id: i64, actor: &CommentActor) -> Result<(), CommentServiceError> {
        let comment = self
            .comments
            .get_by_id(id)
            .await
            .context("Failed to load comment")?
            .ok_or(CommentServiceError::NotFound(id))?;

        if !Policy::CanModerateComments.allows(&actor.roles) && !self.is_owner(&comment, actor).await? {
            return Err(CommentServiceError::Forbidden);
        }
        self.comments.delete(id).await.context("Failed to delete comment")?;
        Ok(())
    }

    /// Delete every comment of a post; returns how many were removed
    pub async fn delete_by_blogg(&self, blogg_id: i64) -> Result<u64, CommentServiceError> {
        Ok(self
            .comments
            .delete_by_blogg(blogg_id)
            .await
            .context("Failed to delete comments")?)
    }

    async fn is_owner(&self, comment: &Comment, actor: &CommentActor) -> Result<bool, CommentServiceError> {
        if comment.user_id == Some(actor.user_id) {
            return Ok(true);
        }
        let Some(email) = comment.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(false);
        };
        let me = self
            .users
            .get_by_id(actor.user_id)
            .await
            .context("Failed to load user")?;
        Ok(me.is_some_and(|u| u.email.trim().eq_ignore_ascii_case(email.trim())))
    }

    async fn to_dtos(&self, comments: Vec<Comment>) -> Result<Vec<CommentDto>, CommentServiceError> {
        let patterns: Vec<String> = self
            .forbidden_words
            .list()
            .await
            .context("Failed to load forbidden words")?
            .into_iter()
            .map(|w| w.word_pattern)
            .collect();
        let censor = build_censor_regex(&patterns);

        let mut authors: HashMap<String, Option<CommentAuthor>> = HashMap::new();
        let mut dtos = Vec::with_capacity(comments.len());
        for comment in comments {
            let key = match (comment.user_id, comment.email.as_deref()) {
                (Some(id), _) => Some(format!("id:{id}")),
                (None, Some(email)) if !email.trim().is_empty() => {
                    Some(format!("email:{}", email.trim().to_lowercase()))
                }
                _ => None,
            };
            let author = match key {
                Some(key) => {
                    if !authors.contains_key(&key) {
                        let resolved = self.resolve_author(&comment).await;
                        authors.insert(key.clone(), resolved);
                    }
                    authors.get(&key).cloned().flatten()
                }
                None => None,
            };
            dtos.push(to_dto(comment, author, censor.as_ref()));
        }
        Ok(dtos)
    }

    /// The account behind a comment; lookup failures only cost the decoration
    async fn resolve_author(&self, comment: &Comment) -> Option<CommentAuthor> {
        let user = match (comment.user_id, comment.email.as_deref()) {
            (Some(id), _) => self.users.get_by_id(id).await,
            (None, Some(email)) => self.users.get_by_email(email).await,
            (None, None) => return None,
        };
        let user = match user {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Could not resolve author of comment {}: {:#}", comment.id, e);
                return None;
            }
        };
        let roles = self.users.get_roles(user.id).await.unwrap_or_default();
        Some(CommentAuthor {
            user_id: user.id,
            email: user.email,
            username: user.username,
            top_role: Role::top(roles.iter().map(String::as_str)).map(|r| r.as_str().to_string()),
        })
    }
}

fn to_dto(comment: Comment, author: Option<CommentAuthor>, censor: Option<&Regex>) -> CommentDto {
    let (name, top_role) = match author {
        Some(author) => (author.username, author.top_role),
        None => (comment.name, None),
    };
    CommentDto {
        id: comment.id,
        blogg_id: comment.blogg_id,
        name: censor_with(&name, censor),
        content: censor_with(&comment.content, censor),
        created_at: comment.created_at,
        top_role,
    }
}
