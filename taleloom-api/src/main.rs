//! Taleloom router server entry point.

use tracing_subscriber::EnvFilter;

use taleloom_api::{app, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env();
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, game_projects_root = %config.game_projects_root.display(), "starting taleloom router");

    let state = AppState::new(config);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    axum::serve(listener, app(state)).await.expect("server error");
}
