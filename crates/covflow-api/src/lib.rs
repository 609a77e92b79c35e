//! Covflow API: HTTP service hosting the commit orchestrator.

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod bus;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

/// Builds the full application router.
pub fn app(state: state::AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/events", routes::events::router())
        .nest("/api/v1/commits", routes::commits::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
