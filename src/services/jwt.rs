//! Access tokens, refresh tokens and single-use identity tokens.
//!
//! Access tokens are HS256-signed JWTs carrying the user's id, username and
//! roles. Refresh tokens and identity tokens (email confirmation, password
//! reset, email change) are opaque random strings; only their SHA-256 hash is
//! persisted.

use anyhow::{Context, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

/// Clock skew tolerated when validating `exp` / `nbf`
const LEEWAY_SECONDS: u64 = 30;

/// Claims embedded in every access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// User id, for clients reading the name-identifier claim
    pub nameid: String,
    pub unique_name: String,
    pub name: String,
    pub jti: String,
    /// Lowercase role names
    #[serde(default)]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub nbf: i64,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Token pair returned by login, refresh and the external-login exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub access_token_expires_utc: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_utc: DateTime<Utc>,
}

/// Issues and validates access tokens
#[derive(Debug, Clone)]
pub struct TokenService {
    config: JwtConfig,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Lifetime of access tokens
    pub fn access_lifetime(&self) -> Duration {
        Duration::minutes(self.config.access_token_minutes)
    }

    /// Default lifetime of refresh tokens
    pub fn refresh_lifetime(&self) -> Duration {
        Duration::days(self.config.refresh_token_days)
    }

    /// Sign an access token for `user` with the given roles.
    pub fn issue_access_token(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires = now + self.access_lifetime();

        let claims = Claims {
            sub: user.id.to_string(),
            nameid: user.id.to_string(),
            unique_name: user.username.clone(),
            name: user.username.clone(),
            jti: Uuid::new_v4().to_string(),
            roles: roles.iter().map(|r| r.to_lowercase()).collect(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.key.as_bytes()),
        )
        .context("Failed to sign access token")?;

        Ok((token, expires))
    }

    /// Validate signature, issuer, audience and lifetime; return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECONDS;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.key.as_bytes()),
            &validation,
        )
        .context("Invalid access token")?;

        Ok(data.claims)
    }
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// SHA-256 hex digest of an opaque token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// New refresh token as `(plaintext, sha256_hex)`.
///
/// The plaintext is standard base64 of 16 random bytes.
pub fn generate_refresh_token() -> (String, String) {
    let plaintext = STANDARD.encode(random_bytes::<16>());
    let hash = hash_token(&plaintext);
    (plaintext, hash)
}

/// New identity token as `(url_safe_plaintext, sha256_hex)`, ready to embed in links.
pub fn generate_identity_token() -> (String, String) {
    let plaintext = URL_SAFE_NO_PAD.encode(random_bytes::<32>());
    let hash = hash_token(&plaintext);
    (plaintext, hash)
}

/// One-time code handed to the frontend after an external login
pub fn generate_one_time_code() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            key: "test-secret-that-is-long-enough-for-hmac-sha256".to_string(),
            issuer: "SarasBloggAPI".to_string(),
            audience: "SarasBloggClient".to_string(),
            access_token_minutes: 60,
            refresh_token_days: 14,
        }
    }

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "sara".into(),
            email: "sara@example.com".into(),
            password_hash: None,
            name: None,
            birth_year: None,
            phone_number: None,
            profile_image_url: None,
            email_confirmed: true,
            notify_on_new_post: false,
            requires_username_setup: false,
            two_factor_enabled: false,
            access_failed_count: 0,
            lockout_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let service = TokenService::new(test_config());
        let (token, expires) = service
            .issue_access_token(&test_user(), &["Admin".to_string(), "user".to_string()])
            .expect("token generation should succeed");

        let claims = service.validate(&token).expect("token should validate");
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.nameid, "42");
        assert_eq!(claims.unique_name, "sara");
        assert_eq!(claims.roles, vec!["admin", "user"]);
        assert_eq!(claims.exp, expires.timestamp());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let service = TokenService::new(test_config());
        let (token, _) = service.issue_access_token(&test_user(), &[]).unwrap();

        let other = TokenService::new(JwtConfig {
            audience: "SomeoneElse".into(),
            ..test_config()
        });
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let service = TokenService::new(test_config());
        let (token, _) = service.issue_access_token(&test_user(), &[]).unwrap();

        let other = TokenService::new(JwtConfig {
            key: "another-secret-that-is-also-long-enough-123".into(),
            ..test_config()
        });
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "1".into(),
            nameid: "1".into(),
            unique_name: "u".into(),
            name: "u".into(),
            jti: "j".into(),
            roles: vec![],
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
            nbf: now - 600,
            iat: now - 600,
            exp: now - 300,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.key.as_bytes()),
        )
        .unwrap();

        assert!(TokenService::new(config).validate(&token).is_err());
    }

    #[test]
    fn test_refresh_token_hash_matches() {
        let (plaintext, hash) = generate_refresh_token();
        assert_eq!(hash, hash_token(&plaintext));
        assert_eq!(hash.len(), 64);
        assert_eq!(STANDARD.decode(&plaintext).unwrap().len(), 16);
    }

    #[test]
    fn test_identity_token_is_url_safe() {
        let (plaintext, hash) = generate_identity_token();
        assert!(plaintext
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(hash, hash_token(&plaintext));
        assert_ne!(generate_identity_token().0, plaintext);
    }
}
