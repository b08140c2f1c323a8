//! Cache layer
//!
//! Short-lived server-side state: one-time codes handed out after an external
//! login and the OAuth `state` values of pending Google sign-ins.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sarasblogg_api::cache::{CacheLayer, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! let once: Option<String> = cache.take("key").await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

pub use memory::MemoryCache;

/// Key prefix for one-time external-login codes
pub const EXTERNAL_CODE_PREFIX: &str = "extcode:";
/// Key prefix for pending OAuth state values
pub const OAUTH_STATE_PREFIX: &str = "oauth_state:";

/// Cache layer trait
///
/// Has generic methods, so it is used through concrete types rather than as a
/// trait object.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Remove a value and return it; a second `take` of the same key yields `None`
    async fn take<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;
}
