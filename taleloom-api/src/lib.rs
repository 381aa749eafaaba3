//! HTTP surface of the taleloom router.
//!
//! Each entry point validates the payload shape, resolves the run location,
//! opens the run store for the duration of the request, enforces the
//! turn-sequencing invariant where applicable, delegates to the core crate,
//! and closes the store on every exit path.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes;
pub mod state;

pub use state::{ApiConfig, AppState};

/// Build the full router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::game_project::router())
        .merge(routes::run::router())
        .merge(routes::turn::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
