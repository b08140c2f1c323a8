//! SarasBlogg API server

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sarasblogg_api::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxRoleRepository, SqlxUserRepository},
    },
    services::seeder,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sarasblogg_api=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SarasBlogg API...");

    let config_path = std::env::var("SARASBLOGG_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load_with_env(Path::new(&config_path))?;
    config.validate()?;
    tracing::info!("Configuration loaded ({:?})", config.environment);

    let pool = db::connect_with_retry(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    if config.database.run_migrations {
        let applied = db::migrations::run_migrations(&pool).await?;
        tracing::info!("Database migrations completed ({} applied)", applied);
    } else {
        tracing::info!("Migrations disabled");
    }

    seeder::seed(
        &config,
        &SqlxRoleRepository::new(pool.clone()),
        &SqlxUserRepository::new(pool.clone()),
    )
    .await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pool, config)?;
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
