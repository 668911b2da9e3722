use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use super::handlers::{get_entities, get_inequality, get_windows};
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/inequality", get(get_inequality))
        .route("/entities", get(get_entities))
        .route("/windows", get(get_windows))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
