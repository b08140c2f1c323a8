//! Startup data: base roles everywhere, the admin account in development

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db::repositories::{RoleRepository, UserRepository};
use crate::models::{NewUser, Role};
use crate::services::password::hash_password;
use crate::services::role::ensure_base_roles;

pub async fn seed(config: &Config, roles: &dyn RoleRepository, users: &dyn UserRepository) -> Result<()> {
    ensure_base_roles(roles).await.context("Failed to seed roles")?;

    if config.environment.is_development() {
        ensure_admin_user(config, users).await?;
    }
    Ok(())
}

/// Create the configured admin account as a confirmed superadmin unless it exists
async fn ensure_admin_user(config: &Config, users: &dyn UserRepository) -> Result<()> {
    let email = config.admin_user.email.trim();
    if users.get_by_email(email).await?.is_some() {
        return Ok(());
    }
    let Some(password) = config.admin_user.password.as_deref().filter(|p| !p.is_empty()) else {
        tracing::warn!("No admin password configured, skipping admin user {}", email);
        return Ok(());
    };

    let username = email.split('@').next().unwrap_or(email).to_string();
    let user = users
        .create(&NewUser {
            username,
            email: email.to_string(),
            password_hash: Some(hash_password(password)?),
            email_confirmed: true,
            ..Default::default()
        })
        .await
        .context("Failed to create admin user")?;
    users
        .add_role(user.id, Role::Superadmin.as_str())
        .await
        .context("Failed to assign superadmin role")?;

    tracing::info!("Seeded admin user {}", email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::db::repositories::{SqlxRoleRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::verify_password;

    async fn repos() -> (SqlxRoleRepository, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (SqlxRoleRepository::new(pool.clone()), SqlxUserRepository::new(pool))
    }

    fn config(environment: Environment) -> Config {
        let mut config = Config::default();
        config.environment = environment;
        config.admin_user.password = Some("Admin123!".into());
        config
    }

    #[tokio::test]
    async fn test_development_seeds_admin_once() {
        let (roles, users) = repos().await;
        let config = config(Environment::Development);

        seed(&config, &roles, &users).await.unwrap();
        seed(&config, &roles, &users).await.unwrap();

        let admin = users.get_by_email("admin@sarasblogg.se").await.unwrap().unwrap();
        assert!(admin.email_confirmed);
        assert!(verify_password("Admin123!", admin.password_hash.as_deref().unwrap()).unwrap());
        assert_eq!(users.get_roles(admin.id).await.unwrap(), vec!["superadmin"]);
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_production_seeds_roles_only() {
        let (roles, users) = repos().await;

        seed(&config(Environment::Production), &roles, &users).await.unwrap();

        assert_eq!(roles.list().await.unwrap().len(), 4);
        assert!(users.list().await.unwrap().is_empty());
    }
}
