//! Database migrations module
//!
//! All migrations are embedded directly in Rust code as SQL strings, supporting
//! both SQLite and PostgreSQL.
//!
//! # Usage
//!
//! ```ignore
//! use sarasblogg_api::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is a `Migration` with a unique `version`, a `name`, and one
//! SQL script per driver (`up_sqlite`, `up_postgres`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and PostgreSQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for PostgreSQL
    pub up_postgres: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i32,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, embedded in the binary.
pub const MIGRATIONS: &[Migration] = &[
    // Accounts, roles and external logins
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(256) NOT NULL,
                email VARCHAR(256) NOT NULL,
                password_hash VARCHAR(255),
                name VARCHAR(100),
                birth_year INTEGER,
                phone_number VARCHAR(50),
                profile_image_url VARCHAR(500),
                email_confirmed BOOLEAN NOT NULL DEFAULT 0,
                notify_on_new_post BOOLEAN NOT NULL DEFAULT 0,
                requires_username_setup BOOLEAN NOT NULL DEFAULT 0,
                two_factor_enabled BOOLEAN NOT NULL DEFAULT 0,
                access_failed_count INTEGER NOT NULL DEFAULT 0,
                lockout_end TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users(LOWER(username));
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(LOWER(email));

            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(256) NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, role_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS user_logins (
                provider VARCHAR(128) NOT NULL,
                provider_key VARCHAR(256) NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (provider, provider_key),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_user_logins_user_id ON user_logins(user_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(256) NOT NULL,
                email VARCHAR(256) NOT NULL,
                password_hash VARCHAR(255),
                name VARCHAR(100),
                birth_year INTEGER,
                phone_number VARCHAR(50),
                profile_image_url VARCHAR(500),
                email_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                notify_on_new_post BOOLEAN NOT NULL DEFAULT FALSE,
                requires_username_setup BOOLEAN NOT NULL DEFAULT FALSE,
                two_factor_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                access_failed_count INTEGER NOT NULL DEFAULT 0,
                lockout_end TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users(LOWER(username));
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(LOWER(email));

            CREATE TABLE IF NOT EXISTS roles (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(256) NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role_id BIGINT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, role_id)
            );

            CREATE TABLE IF NOT EXISTS user_logins (
                provider VARCHAR(128) NOT NULL,
                provider_key VARCHAR(256) NOT NULL,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (provider, provider_key)
            );
            CREATE INDEX IF NOT EXISTS idx_user_logins_user_id ON user_logins(user_id);
        "#,
    },
    // Single-use identity tokens and refresh tokens
    Migration {
        version: 2,
        name: "create_tokens",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS user_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                purpose VARCHAR(32) NOT NULL,
                token_hash VARCHAR(64) NOT NULL,
                new_email VARCHAR(256),
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_user_tokens_hash ON user_tokens(token_hash);
            CREATE INDEX IF NOT EXISTS idx_user_tokens_user ON user_tokens(user_id, purpose);

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                token_hash VARCHAR(64) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                revoked_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS user_tokens (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                purpose VARCHAR(32) NOT NULL,
                token_hash VARCHAR(64) NOT NULL,
                new_email VARCHAR(256),
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_user_tokens_hash ON user_tokens(token_hash);
            CREATE INDEX IF NOT EXISTS idx_user_tokens_user ON user_tokens(user_id, purpose);

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash VARCHAR(64) NOT NULL UNIQUE,
                expires_at TIMESTAMPTZ NOT NULL,
                revoked_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);
        "#,
    },
    // Posts and their gallery images
    Migration {
        version: 3,
        name: "create_bloggs",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS bloggs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(300) NOT NULL,
                content TEXT NOT NULL,
                author VARCHAR(200) NOT NULL DEFAULT '',
                launch_date TIMESTAMP NOT NULL,
                is_archived BOOLEAN NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                hidden BOOLEAN NOT NULL DEFAULT 0,
                user_id INTEGER,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bloggs_launch_date ON bloggs(launch_date);

            CREATE TABLE IF NOT EXISTS blogg_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blogg_id INTEGER NOT NULL,
                file_path VARCHAR(1000) NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (blogg_id) REFERENCES bloggs(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blogg_images_blogg ON blogg_images(blogg_id, sort_order);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS bloggs (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(300) NOT NULL,
                content TEXT NOT NULL,
                author VARCHAR(200) NOT NULL DEFAULT '',
                launch_date TIMESTAMPTZ NOT NULL,
                is_archived BOOLEAN NOT NULL DEFAULT FALSE,
                view_count INTEGER NOT NULL DEFAULT 0,
                hidden BOOLEAN NOT NULL DEFAULT FALSE,
                user_id BIGINT REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bloggs_launch_date ON bloggs(launch_date);

            CREATE TABLE IF NOT EXISTS blogg_images (
                id BIGSERIAL PRIMARY KEY,
                blogg_id BIGINT NOT NULL REFERENCES bloggs(id) ON DELETE CASCADE,
                file_path VARCHAR(1000) NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_blogg_images_blogg ON blogg_images(blogg_id, sort_order);
        "#,
    },
    // Comments and moderation patterns
    Migration {
        version: 4,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blogg_id INTEGER NOT NULL,
                user_id INTEGER,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(256),
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (blogg_id) REFERENCES bloggs(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_comments_blogg ON comments(blogg_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_user ON comments(user_id);

            CREATE TABLE IF NOT EXISTS forbidden_words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word_pattern VARCHAR(500) NOT NULL
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                blogg_id BIGINT NOT NULL REFERENCES bloggs(id) ON DELETE CASCADE,
                user_id BIGINT REFERENCES users(id) ON DELETE CASCADE,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(256),
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_comments_blogg ON comments(blogg_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_user ON comments(user_id);

            CREATE TABLE IF NOT EXISTS forbidden_words (
                id BIGSERIAL PRIMARY KEY,
                word_pattern VARCHAR(500) NOT NULL
            );
        "#,
    },
    // One like per user per post
    Migration {
        version: 5,
        name: "create_blogg_likes",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blogg_likes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blogg_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (blogg_id, user_id),
                FOREIGN KEY (blogg_id) REFERENCES bloggs(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blogg_likes_user ON blogg_likes(user_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS blogg_likes (
                id BIGSERIAL PRIMARY KEY,
                blogg_id BIGINT NOT NULL REFERENCES bloggs(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (blogg_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_blogg_likes_user ON blogg_likes(user_id);
        "#,
    },
    // About-me page and contact form submissions
    Migration {
        version: 6,
        name: "create_about_and_contact",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS about_me (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(300),
                content TEXT,
                image VARCHAR(1000),
                user_id INTEGER,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS contact_me (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(256) NOT NULL,
                subject VARCHAR(300) NOT NULL,
                message TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS about_me (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(300),
                content TEXT,
                image VARCHAR(1000),
                user_id BIGINT REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS contact_me (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(256) NOT NULL,
                subject VARCHAR(300) NOT NULL,
                message TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        "#,
    },
    // Base roles
    Migration {
        version: 7,
        name: "seed_roles",
        up_sqlite: r#"
            INSERT OR IGNORE INTO roles (name) VALUES ('superadmin');
            INSERT OR IGNORE INTO roles (name) VALUES ('admin');
            INSERT OR IGNORE INTO roles (name) VALUES ('superuser');
            INSERT OR IGNORE INTO roles (name) VALUES ('user');
        "#,
        up_postgres: r#"
            INSERT INTO roles (name) VALUES ('superadmin'), ('admin'), ('superuser'), ('user')
            ON CONFLICT (name) DO NOTHING;
        "#,
    },
];

/// Run all pending migrations
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Postgres => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Get list of already applied migrations
async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Postgres => get_applied_migrations_postgres(pool.postgres()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_postgres(pool: &PgPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply a single migration
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Postgres => apply_migration_postgres(pool.postgres()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_postgres(pool: &PgPool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up_postgres) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES ($1, $2)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str, email: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
            .bind(username)
            .bind(email)
            .execute(pool)
            .await
            .expect("Failed to create user")
            .last_insert_rowid()
    }

    async fn insert_blogg(pool: &SqlitePool) -> i64 {
        sqlx::query("INSERT INTO bloggs (title, content, launch_date) VALUES ('T', 'C', CURRENT_TIMESTAMP)")
            .execute(pool)
            .await
            .expect("Failed to create blogg")
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.expect("Failed to check"));
        assert_eq!(pending_count(&pool).await.expect("Failed to check"), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.expect("Failed to check"));
        assert_eq!(pending_count(&pool).await.expect("Failed to check"), 0);
    }

    #[tokio::test]
    async fn test_base_roles_seeded() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.sqlite().unwrap();

        let row = sqlx::query("SELECT COUNT(*) as count FROM roles")
            .fetch_one(sqlite_pool)
            .await
            .expect("Failed to query roles");
        let count: i64 = row.get("count");
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_username_unique_case_insensitive() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.sqlite().unwrap();

        insert_user(sqlite_pool, "Sara", "sara@example.com").await;
        let result = sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
            .bind("sara")
            .bind("other@example.com")
            .execute(sqlite_pool)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_one_like_per_user_per_post() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.sqlite().unwrap();

        let user_id = insert_user(sqlite_pool, "reader", "reader@example.com").await;
        let blogg_id = insert_blogg(sqlite_pool).await;

        let insert = "INSERT INTO blogg_likes (blogg_id, user_id) VALUES (?, ?)";
        sqlx::query(insert)
            .bind(blogg_id)
            .bind(user_id)
            .execute(sqlite_pool)
            .await
            .expect("First like should succeed");

        let second = sqlx::query(insert)
            .bind(blogg_id)
            .bind(user_id)
            .execute(sqlite_pool)
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_deleting_blogg_cascades() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.sqlite().unwrap();

        let user_id = insert_user(sqlite_pool, "reader", "reader@example.com").await;
        let blogg_id = insert_blogg(sqlite_pool).await;

        sqlx::query("INSERT INTO blogg_images (blogg_id, file_path) VALUES (?, 'x.png')")
            .bind(blogg_id)
            .execute(sqlite_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO comments (blogg_id, name, content) VALUES (?, 'n', 'c')")
            .bind(blogg_id)
            .execute(sqlite_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO blogg_likes (blogg_id, user_id) VALUES (?, ?)")
            .bind(blogg_id)
            .bind(user_id)
            .execute(sqlite_pool)
            .await
            .unwrap();

        sqlx::query("DELETE FROM bloggs WHERE id = ?")
            .bind(blogg_id)
            .execute(sqlite_pool)
            .await
            .unwrap();

        for table in ["blogg_images", "comments", "blogg_likes"] {
            let row = sqlx::query(&format!("SELECT COUNT(*) as count FROM {}", table))
                .fetch_one(sqlite_pool)
                .await
                .unwrap();
            let count: i64 = row.get("count");
            assert_eq!(count, 0, "{} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_and_detaches_posts() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.sqlite().unwrap();

        let user_id = insert_user(sqlite_pool, "author", "author@example.com").await;
        let blogg_id = insert_blogg(sqlite_pool).await;
        sqlx::query("UPDATE bloggs SET user_id = ? WHERE id = ?")
            .bind(user_id)
            .bind(blogg_id)
            .execute(sqlite_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO comments (blogg_id, user_id, name, content) VALUES (?, ?, 'n', 'c')")
            .bind(blogg_id)
            .bind(user_id)
            .execute(sqlite_pool)
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(sqlite_pool)
            .await
            .unwrap();

        let row = sqlx::query("SELECT user_id FROM bloggs WHERE id = ?")
            .bind(blogg_id)
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        let owner: Option<i64> = row.get("user_id");
        assert!(owner.is_none());

        let row = sqlx::query("SELECT COUNT(*) as count FROM comments")
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        let count: i64 = row.get("count");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_users"));
        assert!(get_migration(999).is_none());
    }

    #[test]
    fn test_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1);
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- just a comment\n;CREATE TABLE b (id INT)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- a\n   -- b"));
        assert!(!is_comment_only("-- a\nSELECT 1"));
    }

    #[test]
    fn test_truncate_sql() {
        let long = "x".repeat(150);
        assert_eq!(truncate_sql(&long).len(), 103);
        assert_eq!(truncate_sql("short"), "short");
    }
}
