mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/offer", post(handlers::offer))
        .route("/webrtc/close", post(handlers::webrtc_close))
        .route("/motion", get(handlers::motion))
        .route("/admin/users", get(handlers::admin_users))
        .route("/admin/delete", post(handlers::admin_delete))
        .route("/admin/update", post(handlers::admin_update))
        .route("/stream.mjpeg", get(handlers::stream_mjpeg))
        .route("/recording/start", post(handlers::recording_start))
        .route("/recording/stop", post(handlers::recording_stop))
        .route("/api/system/status", get(handlers::system_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
