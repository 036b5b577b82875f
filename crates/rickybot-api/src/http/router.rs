//! Axum router configuration with middleware.
//!
//! Chat routes live under `/api/`; the calculator tool is served at
//! `/tool/{name}`. Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/main", get(handlers::chat::main_page))
        .route("/ask", post(handlers::chat::ask))
        .route("/notifications", get(handlers::ws::notifications));

    Router::new()
        .nest("/api", api_routes)
        .route("/tool/{name}", post(handlers::tool::call_tool))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus a few gauges.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len(),
        "subscribers": state.broker.subscriber_count(),
    }))
}
