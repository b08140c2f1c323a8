//! Moderation patterns and the static About-Me / Contact-Me content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A regex pattern whose matches are censored in comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ForbiddenWord {
    pub id: i64,
    pub word_pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForbiddenWordInput {
    #[serde(default)]
    pub word_pattern: String,
}

/// The single About-Me page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AboutMe {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// A contact form submission
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactMe {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactMeInput {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactMeInput {
    /// Validation messages for missing or malformed fields
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Vänligen ange ditt namn.".to_string());
        }
        let email = self.email.trim();
        if email.is_empty() {
            errors.push("Vänligen ange en e-postadress.".to_string());
        } else if !looks_like_email(email) {
            errors.push("Vänligen ange en giltig e-postadress.".to_string());
        }
        if self.subject.trim().is_empty() {
            errors.push("Vänligen ange ett ämne.".to_string());
        }
        if self.message.trim().is_empty() {
            errors.push("Vänligen skriv ditt meddelande.".to_string());
        }
        errors
    }
}

/// Minimal address shape check: one `@` with text on both sides
pub fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    )
}
