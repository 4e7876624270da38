pub mod extraction;
pub mod health;
pub mod reports;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Multipart framing on top of the file itself.
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.upload.max_file_size_bytes() + BODY_OVERHEAD;

    let session_routes = Router::new()
        .route("/api/sessions", post(sessions::create_session))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/sessions/{id}/extract", post(extraction::extract))
        .route(
            "/api/sessions/{id}/extract/stream",
            post(extraction::extract_stream),
        )
        .route("/api/sessions/{id}/report", put(reports::edit_report))
        .route("/api/sessions/{id}/save", post(reports::save_report))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/api/health", get(health::health_check))
        .merge(session_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
