//! New-post notifications
//!
//! After a visible post is created, every confirmed subscriber receives an
//! email with a link to it. Sending happens in a background task so the
//! creating request is not held up.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::db::repositories::{BloggRepository, UserRepository};
use crate::services::email::EmailSender;

pub struct NewPostNotifier {
    users: Arc<dyn UserRepository>,
    bloggs: Arc<dyn BloggRepository>,
    email: Arc<dyn EmailSender>,
    frontend_base: String,
}

impl NewPostNotifier {
    pub fn new(
        users: Arc<dyn UserRepository>,
        bloggs: Arc<dyn BloggRepository>,
        email: Arc<dyn EmailSender>,
        frontend_base: impl Into<String>,
    ) -> Self {
        Self {
            users,
            bloggs,
            email,
            frontend_base: frontend_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Notify subscribers about `blogg_id` without waiting for the result
    pub fn spawn(self: &Arc<Self>, blogg_id: i64) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match notifier.notify(blogg_id).await {
                Ok(sent) => tracing::info!("New post {} announced to {} subscribers", blogg_id, sent),
                Err(e) => tracing::error!("New post notification for {} failed: {:#}", blogg_id, e),
            }
        });
    }

    /// Email every subscriber; returns how many sends succeeded.
    ///
    /// Missing, hidden and archived posts are skipped.
    pub async fn notify(&self, blogg_id: i64) -> Result<usize> {
        let Some(blogg) = self
            .bloggs
            .get_by_id(blogg_id)
            .await
            .context("Failed to load post")?
        else {
            tracing::warn!("Post {} not found, nothing to announce", blogg_id);
            return Ok(0);
        };
        if !blogg.is_public() {
            tracing::debug!("Post {} is not public, nothing to announce", blogg_id);
            return Ok(0);
        }

        let recipients = self
            .users
            .list_notification_recipients()
            .await
            .context("Failed to load subscribers")?;

        let subject = format!("Nytt inlägg: {}", blogg.title);
        let html = new_post_html(&blogg.title, &self.post_url(blogg.id));

        let mut sent = 0;
        for user in recipients {
            match self.email.send(&user.email, &subject, &html).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!("Failed to notify {}: {:#}", user.email, e),
            }
        }
        Ok(sent)
    }

    fn post_url(&self, blogg_id: i64) -> String {
        format!("{}/Blogg?showId={}", self.frontend_base, blogg_id)
    }
}

fn new_post_html(title: &str, post_url: &str) -> String {
    format!(
        "<p>Hej!</p><p>Ett nytt blogginlägg har publicerats: <strong>{}</strong></p>\
         <p><a href=\"{}\">Läs inlägget</a></p><p>/SarasBlogg</p>",
        escape_html(title),
        post_url
    )
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
