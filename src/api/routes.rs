use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

async fn health_check() -> &'static str {
    "ok"
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/card", get(handlers::get_card))
        .route(
            "/api/items",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/api/items/{id}",
            patch(handlers::update_item).delete(handlers::delete_item),
        )
        .route("/api/items/clear-completed", post(handlers::clear_completed))
        .route("/api/suggest", get(handlers::suggest))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
