//! External identity providers
//!
//! Only Google is implemented: the authorization-code flow against Google's
//! OAuth 2.0 endpoints, followed by a userinfo lookup.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GoogleConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Identity asserted by an external provider
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIdentity {
    /// Stable subject id at the provider
    pub provider_key: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait ExternalIdentityProvider: Send + Sync {
    /// Provider name stored with linked logins
    fn name(&self) -> &str;

    /// Where to send the browser to start a sign-in
    fn authorization_url(&self, state: &str) -> String;

    /// Redeem an authorization code for the signed-in identity
    async fn fetch_identity(&self, code: &str) -> Result<ExternalIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    name: Option<String>,
}

pub struct GoogleProvider {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ExternalIdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        "Google"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
            AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state)
        )
    }

    async fn fetch_identity(&self, code: &str) -> Result<ExternalIdentity> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Google token request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google token exchange answered {}: {}", status, body));
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("Unreadable Google token response")?;

        let info: UserInfo = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("Google userinfo request failed")?
            .error_for_status()
            .context("Google userinfo rejected")?
            .json()
            .await
            .context("Unreadable Google userinfo")?;

        Ok(identity_from(info))
    }
}

/// Unverified addresses are not trusted for account matching
fn identity_from(info: UserInfo) -> ExternalIdentity {
    let email = match info.email_verified {
        Some(false) => None,
        _ => info.email.filter(|e| !e.trim().is_empty()),
    };
    ExternalIdentity {
        provider_key: info.sub,
        email,
        name: info.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let provider = GoogleProvider::new(GoogleConfig {
            client_id: "client-1".into(),
            client_secret: "secret".into(),
            redirect_url: "https://api.sarasblogg.se/api/auth/external/google".into(),
        });
        let url = provider.authorization_url("abc");

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fapi.sarasblogg.se%2Fapi%2Fauth%2Fexternal%2Fgoogle"
        ));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("state=abc"));
    }

    #[test]
    fn test_unverified_email_is_dropped() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"1","email":"a@example.com","email_verified":false,"name":"A"}"#,
        )
        .unwrap();
        assert_eq!(identity_from(info).email, None);

        let info: UserInfo =
            serde_json::from_str(r#"{"sub":"2","email":"b@example.com","email_verified":true}"#)
                .unwrap();
        let identity = identity_from(info);
        assert_eq!(identity.provider_key, "2");
        assert_eq!(identity.email.as_deref(), Some("b@example.com"));
    }
}
