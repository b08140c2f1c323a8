//! Role management
//!
//! The four built-in roles always exist and cannot be deleted; superadmins
//! may add and remove custom roles.

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::RoleRepository;
use crate::models::Role;

#[derive(Debug, thiserror::Error)]
pub enum RoleServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct RoleService {
    repo: Arc<dyn RoleRepository>,
}

impl RoleService {
    pub fn new(repo: Arc<dyn RoleRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<String>, RoleServiceError> {
        Ok(self.repo.list().await.context("Failed to list roles")?)
    }

    /// Create `name` (lowercased). Creating an existing role succeeds.
    pub async fn create(&self, name: &str) -> Result<String, RoleServiceError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(RoleServiceError::BadRequest("Rollnamn saknas.".into()));
        }
        if self.repo.create(&name).await.context("Failed to create role")? {
            tracing::info!("Role '{}' created", name);
        }
        Ok(name)
    }

    pub async fn delete(&self, name: &str) -> Result<(), RoleServiceError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(RoleServiceError::BadRequest("Rollnamn krävs.".into()));
        }
        if Role::is_protected(&name) {
            return Err(RoleServiceError::BadRequest(format!(
                "Rollen '{name}' kan inte tas bort."
            )));
        }
        if !self.repo.delete(&name).await.context("Failed to delete role")? {
            return Err(RoleServiceError::NotFound(format!("Rollen '{name}' finns inte.")));
        }
        tracing::info!("Role '{}' deleted", name);
        Ok(())
    }
}

/// Make sure the built-in roles exist
pub async fn ensure_base_roles(repo: &dyn RoleRepository) -> anyhow::Result<()> {
    for role in Role::ALL {
        if repo.create(role.as_str()).await? {
            tracing::info!("Seeded role '{}'", role);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxRoleRepository;
    use crate::db::{create_test_pool, migrations};

    async fn service() -> RoleService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        RoleService::new(SqlxRoleRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_create_is_lowercased_and_idempotent() {
        let service = service().await;
        assert_eq!(service.create(" Redaktör ").await.unwrap(), "redaktör");
        service.create("REDAKTÖR").await.unwrap();

        let roles = service.list().await.unwrap();
        assert_eq!(roles.iter().filter(|r| *r == "redaktör").count(), 1);

        let err = service.create("  ").await.unwrap_err();
        assert!(matches!(err, RoleServiceError::BadRequest(m) if m == "Rollnamn saknas."));
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let service = service().await;
        service.create("gäst").await.unwrap();

        let err = service.delete("Admin").await.unwrap_err();
        assert!(matches!(err, RoleServiceError::BadRequest(m) if m == "Rollen 'admin' kan inte tas bort."));
        let err = service.delete("").await.unwrap_err();
        assert!(matches!(err, RoleServiceError::BadRequest(m) if m == "Rollnamn krävs."));

        service.delete("gäst").await.unwrap();
        let err = service.delete("gäst").await.unwrap_err();
        assert!(matches!(err, RoleServiceError::NotFound(m) if m == "Rollen 'gäst' finns inte."));
    }

    #[tokio::test]
    async fn test_base_roles_are_seeded_once() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxRoleRepository::new(pool);

        ensure_base_roles(&repo).await.unwrap();
        ensure_base_roles(&repo).await.unwrap();
        assert_eq!(
            repo.list().await.unwrap(),
            vec!["admin", "superadmin", "superuser", "user"]
        );
    }
}
