//! Role repository

use crate::db::{with_pool, DynDatabasePool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// All role names, sorted
    async fn list(&self) -> Result<Vec<String>>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Create a role; returns false when it already exists
    async fn create(&self, name: &str) -> Result<bool>;

    /// Delete a role and its memberships; returns false when it did not exist
    async fn delete(&self, name: &str) -> Result<bool>;
}

pub struct SqlxRoleRepository {
    pool: DynDatabasePool,
}

impl SqlxRoleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RoleRepository> {
        Arc::new(Self::new(pool))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[async_trait]
impl RoleRepository for SqlxRoleRepository {
    async fn list(&self) -> Result<Vec<String>> {
        with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, String>("SELECT name FROM roles ORDER BY name")
                .fetch_all(conn)
                .await
                .context("Failed to list roles")
        })
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let count: i64 = with_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles WHERE name = $1")
                .bind(normalize(name))
                .fetch_one(conn)
                .await
                .context("Failed to check role")
        })?;
        Ok(count > 0)
    }

    async fn create(&self, name: &str) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(normalize(name))
                .execute(conn)
                .await
                .context("Failed to create role")
                .map(|r| r.rows_affected() > 0)
        })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        with_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM roles WHERE name = $1")
                .bind(normalize(name))
                .execute(conn)
                .await
                .context("Failed to delete role")
                .map(|r| r.rows_affected() > 0)
        })
    }
}
