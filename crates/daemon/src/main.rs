use std::sync::Arc;

use daemon::{api, db::Database, DaemonConfig, Providers, SessionRegistry};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("daemon=info,engine=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DaemonConfig::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(&config.db_path)?);
    info!("Database initialized at {:?}", config.db_path);

    let providers = Providers::http(&config)?;
    info!(
        collaborator = %config.collaborator_url,
        render = %config.render_url,
        keyword_backend = config.pipeline.keyword_backend.as_str(),
        "Providers configured"
    );

    let addr = config.addr;
    let registry = Arc::new(SessionRegistry::new(providers, config, Some(db)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    let app = api::router(registry)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("Starting daemon server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
