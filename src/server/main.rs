use std::sync::Arc;

use axum::Router;
use sea_orm::Database;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use migration::{Migrator, MigratorTrait};

mod business_logic;
mod config;
mod matcher;
mod rest_api;
mod service_core;
mod web;

/// Driver packages can be large; the default 2 MB body cap is far too small.
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driverhub_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Data directories (database + driver packages)
    let paths = config::DataPaths::from_env();
    paths.ensure()?;

    // 2. DB
    let conn = Database::connect(paths.database_url()).await?;
    Migrator::up(&conn, None).await?;

    // 3. Service state (shared between endpoints)
    let state = Arc::new(service_core::ServiceState {
        db: conn,
        paths: paths.clone(),
    });

    // 4. Combined app: management page, REST API, direct downloads of stored packages
    let app = Router::new()
        .merge(web::router(state.clone()))
        .merge(rest_api::router(state))
        .nest_service("/static", ServeDir::new(&paths.drivers_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("DRIVERHUB_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

    println!("Driver catalog listening on http://{}", addr);
    println!("Management UI on http://{}/", addr);
    println!("Package downloads served from {}", paths.drivers_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
