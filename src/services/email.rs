//! Outgoing email
//!
//! `EmailSender` is implemented by:
//! - `DevEmailSender`: logs the message instead of sending it
//! - `SendGridEmailSender`: SendGrid v3 mail/send API
//! - `SmtpEmailSender`: plain SMTP via lettre
//!
//! The implementation is selected by `email.mode` in the configuration.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::{EmailConfig, EmailMode};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<.*?>").expect("valid tag regex"));

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send an HTML email to a single recipient
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// Build the sender selected by configuration
pub fn create_email_sender(config: &EmailConfig) -> Result<Arc<dyn EmailSender>> {
    let sender: Arc<dyn EmailSender> = match config.mode {
        EmailMode::Dev => Arc::new(DevEmailSender),
        EmailMode::Sendgrid => Arc::new(SendGridEmailSender::new(config.clone())?),
        EmailMode::Smtp => Arc::new(SmtpEmailSender::new(config.clone())?),
    };
    tracing::info!("Email sender: {:?}", config.mode);
    Ok(sender)
}

/// Logs emails instead of sending them
pub struct DevEmailSender;

#[async_trait]
impl EmailSender for DevEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        tracing::info!(
            "DEV EMAIL\nTo: {}\nSubject: {}\nBody:\n{}",
            to,
            subject,
            html_body
        );
        Ok(())
    }
}

/// Sends through the SendGrid HTTP API
pub struct SendGridEmailSender {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    config: EmailConfig,
}

impl SendGridEmailSender {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let api_key = config
            .sendgrid_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing email.sendgrid_api_key"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: SENDGRID_URL.to_string(),
            config,
        })
    }

    /// Post to another mail/send endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload(&self, to: &str, subject: &str, html_body: &str) -> Value {
        build_sendgrid_payload(&self.config, to, subject, html_body)
    }
}

/// SendGrid v3 request body with a plain-text alternative
pub(crate) fn build_sendgrid_payload(
    config: &EmailConfig,
    to: &str,
    subject: &str,
    html_body: &str,
) -> Value {
    let reply_to = config
        .reply_to
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(|r| json!({ "email": r }));

    json!({
        "personalizations": [{ "to": [{ "email": to }] }],
        "from": { "email": config.from_email, "name": config.from_name },
        "reply_to": reply_to,
        "subject": subject,
        "content": [
            { "type": "text/plain", "value": html_to_plain_text(html_body) },
            { "type": "text/html", "value": html_body }
        ]
    })
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(to, subject, html_body))
            .send()
            .await
            .context("SendGrid request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("SendGrid failed: {} {}", status, body);
            return Err(anyhow!("Email send failed"));
        }
        Ok(())
    }
}

/// Sends through an SMTP relay
pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Result<Self> {
        if config.smtp_host.trim().is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }

        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?;

        let mailer = builder
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .port(config.smtp_port)
            .build();

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;
        let reply_to = match config.reply_to.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(addr) => Some(
                addr.parse::<Mailbox>()
                    .map_err(|e| anyhow!("Invalid reply-to address: {}", e))?,
            ),
            None => None,
        };

        Ok(Self {
            mailer,
            from,
            reply_to,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse::<Mailbox>()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                html_to_plain_text(html_body),
                html_body.to_string(),
            ))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Strip tags and decode the common HTML entities
pub fn html_to_plain_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let text = TAG_RE.replace_all(html, "");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
