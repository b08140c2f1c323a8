//! Configuration management
//!
//! This module handles loading and parsing configuration for the SarasBlogg API.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Secrets (JWT key,
//! storage token, mail keys) are expected to come from the environment in
//! deployed environments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder shipped in sample configuration files; never a usable key.
pub const JWT_KEY_PLACEHOLDER: &str = "___SET_VIA_SECRETS_OR_ENV___";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hosting environment
    #[serde(default)]
    pub environment: Environment,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Access and refresh token settings
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Frontend the API builds links for
    #[serde(default)]
    pub frontend: FrontendConfig,
    /// Account flow switches
    #[serde(default)]
    pub auth: AuthConfig,
    /// Seeded system administrator
    #[serde(default)]
    pub admin_user: AdminUserConfig,
    /// Outgoing email
    #[serde(default)]
    pub email: EmailConfig,
    /// Image storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Comment moderation via the Perspective API
    #[serde(default)]
    pub content_safety: ContentSafetyConfig,
    /// Google external login
    #[serde(default)]
    pub google: GoogleConfig,
}

/// Hosting environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Extra CORS origins as a comma separated list (convenient for env vars)
    #[serde(default)]
    pub cors_origins_csv: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            cors_origins_csv: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["https://localhost:5001".to_string()]
}

impl ServerConfig {
    /// All configured CORS origins, normalized.
    ///
    /// Entries from `cors_origins` and `cors_origins_csv` are trimmed, stripped
    /// of a trailing slash and deduplicated case-insensitively (first one wins).
    pub fn allowed_origins(&self) -> Vec<String> {
        let csv = self.cors_origins_csv.as_deref().unwrap_or_default();
        let mut origins: Vec<String> = Vec::new();

        for raw in self.cors_origins.iter().map(String::as_str).chain(csv.split(',')) {
            let origin = raw.trim().trim_end_matches('/');
            if origin.is_empty() {
                continue;
            }
            if origins.iter().any(|o| o.eq_ignore_ascii_case(origin)) {
                continue;
            }
            origins.push(origin.to_string());
        }

        origins
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or postgres)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Run pending migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// How many times to ping the database before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// First retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_connect_initial_delay_ms")]
    pub connect_initial_delay_ms: u64,
    /// Upper bound for the retry delay in milliseconds
    #[serde(default = "default_connect_max_delay_ms")]
    pub connect_max_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            run_migrations: true,
            connect_attempts: default_connect_attempts(),
            connect_initial_delay_ms: default_connect_initial_delay_ms(),
            connect_max_delay_ms: default_connect_max_delay_ms(),
        }
    }
}

fn default_database_url() -> String {
    "data/sarasblogg.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_attempts() -> u32 {
    8
}

fn default_connect_initial_delay_ms() -> u64 {
    1000
}

fn default_connect_max_delay_ms() -> u64 {
    15_000
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// PostgreSQL
    Postgres,
}

/// JWT settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing key
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    /// Refresh token lifetime in days
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            issuer: default_issuer(),
            audience: default_audience(),
            access_token_minutes: default_access_token_minutes(),
            refresh_token_days: default_refresh_token_days(),
        }
    }
}

fn default_issuer() -> String {
    "SarasBloggAPI".to_string()
}

fn default_audience() -> String {
    "SarasBloggClient".to_string()
}

fn default_access_token_minutes() -> i64 {
    60
}

fn default_refresh_token_days() -> i64 {
    14
}

/// Frontend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Public base URL of the Razor frontend, used in emailed links
    #[serde(default = "default_frontend_base_url")]
    pub base_url: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            base_url: default_frontend_base_url(),
        }
    }
}

fn default_frontend_base_url() -> String {
    "https://localhost:5001".to_string()
}

impl FrontendConfig {
    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `scheme://host[:port]` of the base URL.
    pub fn origin(&self) -> String {
        let base = self.base();
        match base.find("://") {
            Some(idx) => {
                let rest = &base[idx + 3..];
                let host_end = rest.find('/').unwrap_or(rest.len());
                format!("{}{}", &base[..idx + 3], &rest[..host_end])
            }
            None => base.to_string(),
        }
    }
}

/// Account flow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Include confirmation links in register responses even in production
    #[serde(default)]
    pub expose_confirm_link_in_response: bool,
}

/// The seeded system administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserConfig {
    /// Email of the protected system account
    #[serde(default = "default_admin_email")]
    pub email: String,
    /// Initial password (only used by the development seeder)
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminUserConfig {
    fn default() -> Self {
        Self {
            email: default_admin_email(),
            password: None,
        }
    }
}

fn default_admin_email() -> String {
    "admin@sarasblogg.se".to_string()
}

/// Email delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailMode {
    /// Log emails instead of sending them
    #[default]
    Dev,
    /// SendGrid HTTP API
    Sendgrid,
    /// Plain SMTP relay
    Smtp,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub mode: EmailMode,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            mode: EmailMode::default(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            reply_to: None,
            sendgrid_api_key: None,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        }
    }
}

fn default_from_email() -> String {
    "no-reply@sarasblogg.se".to_string()
}

fn default_from_name() -> String {
    "SarasBlogg".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Image storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Local disk, served by `/media`
    #[default]
    Local,
    /// Committed to a GitHub repository and served from raw.githubusercontent.com
    Github,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub mode: StorageMode,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub github: GitHubStorageConfig,
}

/// Local disk storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Directory files are written below
    #[serde(default = "default_local_base_path")]
    pub base_path: PathBuf,
    /// Public URL prefix pointing at the `/media` endpoint
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    /// Top-level folder inside the base path
    #[serde(default = "default_upload_folder")]
    pub root_folder: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_local_base_path(),
            base_url: default_local_base_url(),
            root_folder: default_upload_folder(),
        }
    }
}

fn default_local_base_path() -> PathBuf {
    PathBuf::from("SarasBlogg-Media")
}

fn default_local_base_url() -> String {
    "https://localhost:5003/media".to_string()
}

fn default_upload_folder() -> String {
    "uploads".to_string()
}

/// GitHub repository storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubStorageConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_upload_folder")]
    pub upload_folder: String,
    /// Optional environment segment, e.g. `test` or `prod`
    #[serde(default)]
    pub media_env: Option<String>,
    /// Contents API base URL
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
}

impl Default for GitHubStorageConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            token: String::new(),
            upload_folder: default_upload_folder(),
            media_env: None,
            api_base: default_github_api_base(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Perspective API content moderation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSafetyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Score at or above which a text counts as unsafe
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for ContentSafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    0.7
}

/// Google OAuth client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Callback URL registered with Google (points at `/api/auth/external/google`)
    #[serde(default)]
    pub redirect_url: String,
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `SARASBLOGG_<SECTION>_<KEY>`:
    /// - SARASBLOGG_ENVIRONMENT
    /// - SARASBLOGG_SERVER_HOST, SARASBLOGG_SERVER_PORT, SARASBLOGG_SERVER_CORS_ORIGINS
    /// - SARASBLOGG_DATABASE_DRIVER, SARASBLOGG_DATABASE_URL
    /// - SARASBLOGG_JWT_KEY, SARASBLOGG_JWT_ISSUER, SARASBLOGG_JWT_AUDIENCE
    /// - SARASBLOGG_FRONTEND_BASE_URL
    /// - SARASBLOGG_ADMIN_EMAIL, SARASBLOGG_ADMIN_PASSWORD
    /// - SARASBLOGG_EMAIL_MODE, SARASBLOGG_SENDGRID_API_KEY, SARASBLOGG_SMTP_*
    /// - SARASBLOGG_STORAGE_MODE, SARASBLOGG_GITHUB_*
    /// - SARASBLOGG_PERSPECTIVE_API_KEY
    /// - SARASBLOGG_GOOGLE_CLIENT_ID, SARASBLOGG_GOOGLE_CLIENT_SECRET
    ///
    /// `DATABASE_URL` and `DISABLE_MIGRATIONS` are honoured as well.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Some(env) = env_var("SARASBLOGG_ENVIRONMENT").and_then(|v| Environment::parse(&v)) {
            self.environment = env;
        }

        // Server
        if let Some(host) = env_var("SARASBLOGG_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("SARASBLOGG_SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(origins) = env_var("SARASBLOGG_SERVER_CORS_ORIGINS") {
            self.server.cors_origins_csv = Some(origins);
        }

        // Database
        if let Some(driver) = env_var("SARASBLOGG_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "postgres" | "postgresql" => self.database.driver = DatabaseDriver::Postgres,
                _ => {} // Ignore invalid values
            }
        }
        if let Some(url) = env_var("SARASBLOGG_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = env_var("DATABASE_URL") {
            if url.starts_with("postgres://") || url.starts_with("postgresql://") {
                self.database.driver = DatabaseDriver::Postgres;
            }
            self.database.url = url;
        }
        if let Some(flag) = env_var("DISABLE_MIGRATIONS") {
            if flag.eq_ignore_ascii_case("true") || flag == "1" {
                self.database.run_migrations = false;
            }
        }

        // Tokens
        if let Some(key) = env_var("SARASBLOGG_JWT_KEY") {
            self.jwt.key = key;
        }
        if let Some(issuer) = env_var("SARASBLOGG_JWT_ISSUER") {
            self.jwt.issuer = issuer;
        }
        if let Some(audience) = env_var("SARASBLOGG_JWT_AUDIENCE") {
            self.jwt.audience = audience;
        }

        if let Some(url) = env_var("SARASBLOGG_FRONTEND_BASE_URL") {
            self.frontend.base_url = url;
        }
        if let Some(email) = env_var("SARASBLOGG_ADMIN_EMAIL") {
            self.admin_user.email = email;
        }
        if let Some(password) = env_var("SARASBLOGG_ADMIN_PASSWORD") {
            self.admin_user.password = Some(password);
        }

        // Email
        if let Some(mode) = env_var("SARASBLOGG_EMAIL_MODE") {
            match mode.to_lowercase().as_str() {
                "dev" => self.email.mode = EmailMode::Dev,
                "sendgrid" => self.email.mode = EmailMode::Sendgrid,
                "smtp" => self.email.mode = EmailMode::Smtp,
                _ => {}
            }
        }
        if let Some(key) = env_var("SARASBLOGG_SENDGRID_API_KEY") {
            self.email.sendgrid_api_key = Some(key);
        }
        if let Some(host) = env_var("SARASBLOGG_SMTP_HOST") {
            self.email.smtp_host = host;
        }
        if let Some(port) = env_var("SARASBLOGG_SMTP_PORT").and_then(|p| p.parse().ok()) {
            self.email.smtp_port = port;
        }
        if let Some(username) = env_var("SARASBLOGG_SMTP_USERNAME") {
            self.email.smtp_username = username;
        }
        if let Some(password) = env_var("SARASBLOGG_SMTP_PASSWORD") {
            self.email.smtp_password = password;
        }

        // Storage
        if let Some(mode) = env_var("SARASBLOGG_STORAGE_MODE") {
            match mode.to_lowercase().as_str() {
                "local" => self.storage.mode = StorageMode::Local,
                "github" => self.storage.mode = StorageMode::Github,
                _ => {}
            }
        }
        if let Some(owner) = env_var("SARASBLOGG_GITHUB_OWNER") {
            self.storage.github.owner = owner;
        }
        if let Some(repo) = env_var("SARASBLOGG_GITHUB_REPO") {
            self.storage.github.repo = repo;
        }
        if let Some(branch) = env_var("SARASBLOGG_GITHUB_BRANCH") {
            self.storage.github.branch = branch;
        }
        if let Some(token) = env_var("SARASBLOGG_GITHUB_TOKEN") {
            self.storage.github.token = token;
        }
        if let Some(media_env) = env_var("SARASBLOGG_GITHUB_MEDIA_ENV") {
            self.storage.github.media_env = Some(media_env);
        }

        if let Some(key) = env_var("SARASBLOGG_PERSPECTIVE_API_KEY") {
            self.content_safety.api_key = Some(key);
        }

        if let Some(id) = env_var("SARASBLOGG_GOOGLE_CLIENT_ID") {
            self.google.client_id = id;
        }
        if let Some(secret) = env_var("SARASBLOGG_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = secret;
        }
        if let Some(url) = env_var("SARASBLOGG_GOOGLE_REDIRECT_URL") {
            self.google.redirect_url = url;
        }
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.jwt.key.trim();
        if key.is_empty() || key == JWT_KEY_PLACEHOLDER {
            return Err(ConfigError::ValidationError(
                "jwt.key is missing. Set it via SARASBLOGG_JWT_KEY".to_string(),
            ));
        }
        if key.len() < 32 {
            return Err(ConfigError::ValidationError(
                "jwt.key must be at least 32 bytes".to_string(),
            ));
        }

        if self.storage.mode == StorageMode::Github {
            let gh = &self.storage.github;
            if gh.owner.trim().is_empty() || gh.repo.trim().is_empty() || gh.token.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "storage.github requires owner, repo and token".to_string(),
                ));
            }
        }

        if self.email.mode == EmailMode::Sendgrid
            && self.email.sendgrid_api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "email.sendgrid_api_key is required when email.mode is sendgrid".to_string(),
            ));
        }

        if self.email.mode == EmailMode::Smtp && self.email.smtp_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "email.smtp_host is required when email.mode is smtp".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const OVERRIDE_VARS: &[&str] = &[
    "SARASBLOGG_ENVIRONMENT",
    "SARASBLOGG_SERVER_HOST",
    "SARASBLOGG_SERVER_PORT",
    "SARASBLOGG_SERVER_CORS_ORIGINS",
    "SARASBLOGG_DATABASE_DRIVER",
    "SARASBLOGG_DATABASE_URL",
    "DATABASE_URL",
    "DISABLE_MIGRATIONS",
    "SARASBLOGG_JWT_KEY",
    "SARASBLOGG_EMAIL_MODE",
    "SARASBLOGG_STORAGE_MODE",
    "SARASBLOGG_GITHUB_TOKEN",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for var in super::OVERRIDE_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.jwt.key = "k".repeat(48);
        config
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/sarasblogg.db");
        assert_eq!(config.database.connect_attempts, 8);
        assert_eq!(config.jwt.access_token_minutes, 60);
        assert_eq!(config.jwt.refresh_token_days, 14);
        assert_eq!(config.storage.mode, StorageMode::Local);
        assert_eq!(config.storage.github.branch, "main");
        assert_eq!(config.email.mode, EmailMode::Dev);
        assert_eq!(config.admin_user.email, "admin@sarasblogg.se");
        assert!((config.content_safety.threshold - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"
environment: production
server:
  port: 5003
  cors_origins: ["https://sarasblogg.se/"]
database:
  driver: postgres
  url: "postgres://blog:pw@db/sarasblogg"
jwt:
  key: "0123456789abcdef0123456789abcdef"
  access_token_minutes: 30
storage:
  mode: github
  github:
    owner: sara
    repo: media
    token: ghp_x
    media_env: prod
email:
  mode: sendgrid
  sendgrid_api_key: SG.key
"#).unwrap();

        let config = Config::load(file.path()).unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.server.port, 5003);
        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
        assert_eq!(config.jwt.access_token_minutes, 30);
        assert_eq!(config.jwt.issuer, "SarasBloggAPI");
        assert_eq!(config.storage.mode, StorageMode::Github);
        assert_eq!(config.storage.github.media_env.as_deref(), Some("prod"));
        assert_eq!(config.storage.github.upload_folder, "uploads");
        assert_eq!(config.email.mode, EmailMode::Sendgrid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_validate_rejects_missing_or_placeholder_key() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.jwt.key = JWT_KEY_PLACEHOLDER.to_string();
        assert!(config.validate().is_err());

        config.jwt.key = "short".to_string();
        assert!(config.validate().is_err());

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_github_requires_credentials() {
        let mut config = valid_config();
        config.storage.mode = StorageMode::Github;
        assert!(config.validate().is_err());

        config.storage.github.owner = "sara".into();
        config.storage.github.repo = "media".into();
        config.storage.github.token = "token".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_sendgrid_requires_key() {
        let mut config = valid_config();
        config.email.mode = EmailMode::Sendgrid;
        assert!(config.validate().is_err());
        config.email.sendgrid_api_key = Some("SG.x".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allowed_origins_are_normalized() {
        let server = ServerConfig {
            cors_origins: vec![
                "https://localhost:5001/".to_string(),
                " https://sarasblogg.se ".to_string(),
            ],
            cors_origins_csv: Some("https://SARASBLOGG.se/, ,https://www.sarasblogg.se".to_string()),
            ..ServerConfig::default()
        };

        assert_eq!(
            server.allowed_origins(),
            vec![
                "https://localhost:5001".to_string(),
                "https://sarasblogg.se".to_string(),
                "https://www.sarasblogg.se".to_string(),
            ]
        );
    }

    #[test]
    fn test_frontend_origin() {
        let frontend = FrontendConfig {
            base_url: "https://sarasblogg.se/blog/".to_string(),
        };
        assert_eq!(frontend.base(), "https://sarasblogg.se/blog");
        assert_eq!(frontend.origin(), "https://sarasblogg.se");

        let local = FrontendConfig {
            base_url: "https://localhost:5001".to_string(),
        };
        assert_eq!(local.origin(), "https://localhost:5001");
    }

    #[test]
    fn test_env_override_server_and_secrets() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("SARASBLOGG_SERVER_PORT", "4000");
        std::env::set_var("SARASBLOGG_JWT_KEY", "from-env-from-env-from-env-from-env");
        std::env::set_var("SARASBLOGG_ENVIRONMENT", "Production");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.jwt.key, "from-env-from-env-from-env-from-env");
        assert_eq!(config.environment, Environment::Production);

        std::env::remove_var("SARASBLOGG_SERVER_PORT");
        std::env::remove_var("SARASBLOGG_JWT_KEY");
        std::env::remove_var("SARASBLOGG_ENVIRONMENT");
    }

    #[test]
    fn test_env_database_url_selects_postgres() {
        let _guard = lock_env();

        std::env::set_var("DATABASE_URL", "postgres://u:p@localhost/blog");
        std::env::set_var("DISABLE_MIGRATIONS", "true");

        let config = Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();

        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
        assert_eq!(config.database.url, "postgres://u:p@localhost/blog");
        assert!(!config.database.run_migrations);

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DISABLE_MIGRATIONS");
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\ndatabase:\n  driver: sqlite\n").unwrap();

        std::env::set_var("SARASBLOGG_SERVER_PORT", "not_a_number");
        std::env::set_var("SARASBLOGG_DATABASE_DRIVER", "mongodb");
        std::env::set_var("SARASBLOGG_STORAGE_MODE", "s3");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.storage.mode, StorageMode::Local);

        std::env::remove_var("SARASBLOGG_SERVER_PORT");
        std::env::remove_var("SARASBLOGG_DATABASE_DRIVER");
        std::env::remove_var("SARASBLOGG_STORAGE_MODE");
    }
}

/// Property-based tests for configuration parsing
#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn origin_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "https://[a-z]{1,10}\\.se".prop_map(|s| s),
            "https://[a-z]{1,10}\\.se/".prop_map(|s| s),
            Just("https://localhost:5001".to_string()),
        ]
    }

    /// Strategy for malformed YAML that must fail to parse as Config
    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: true".to_string()),
            Just("server:\n  port: 99999999999999999999".to_string()),
            Just("database:\n  driver: mongodb".to_string()),
            Just("storage:\n  mode: s3".to_string()),
            Just("email:\n  mode: carrier_pigeon".to_string()),
            Just("jwt:\n  access_token_minutes: soon".to_string()),
            Just("server: [invalid, list]".to_string()),
            Just("database: \"just_a_string\"".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_port_roundtrips_through_yaml(port in 1u16..=65535) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", port).unwrap();

            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        }

        #[test]
        fn prop_malformed_yaml_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let result = Config::load(file.path());
            prop_assert!(result.is_err());
        }

        #[test]
        fn prop_allowed_origins_have_no_trailing_slash_or_duplicates(
            origins in proptest::collection::vec(origin_strategy(), 0..8)
        ) {
            let server = ServerConfig {
                cors_origins: origins,
                ..ServerConfig::default()
            };
            let allowed = server.allowed_origins();

            for origin in &allowed {
                prop_assert!(!origin.ends_with('/'));
                let dupes = allowed.iter().filter(|o| o.eq_ignore_ascii_case(origin)).count();
                prop_assert_eq!(dupes, 1);
            }
        }
    }
}
