//! Database layer
//!
//! This module provides database abstraction for the SarasBlogg API.
//! It supports:
//! - SQLite (default, local development and tests)
//! - PostgreSQL (deployed environments)
//!
//! The database driver is selected based on configuration.
//!
//! # Architecture
//!
//! The database layer uses a trait-based abstraction (`DatabasePool`) so the
//! application can work with either backend without knowing which one is in
//! use. Repositories write their SQL once with `$N` placeholders (understood by
//! both drivers) and dispatch on the driver with [`with_pool!`].
//!
//! # Usage
//!
//! ```ignore
//! use sarasblogg_api::config::DatabaseConfig;
//! use sarasblogg_api::db::{create_pool, DatabasePool, migrations};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

/// Run `$body` with `$conn` bound to the concrete pool behind a [`DynDatabasePool`].
///
/// The body is expanded once per driver, so it may use driver-generic sqlx calls
/// (`sqlx::query_as::<_, T>(..).fetch_all($conn)`).
macro_rules! with_pool {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool.sqlite()?;
                $body
            }
            $crate::config::DatabaseDriver::Postgres => {
                let $conn = $pool.postgres()?;
                $body
            }
        }
    };
}
pub(crate) use with_pool;

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    connect_with_retry, create_pool, create_test_pool, DatabasePool, DynDatabasePool,
    PostgresDatabase, SqliteDatabase,
};
