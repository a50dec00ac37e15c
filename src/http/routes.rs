use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Devices
        .route("/devices", get(handlers::list_devices))
        // Room membership
        .route("/rooms", post(handlers::create_room))
        .route("/rooms/:room_id/join", post(handlers::join_room))
        .route("/rooms/:room_id/leave", post(handlers::leave_room))
        .route("/rooms/:room_id/status", get(handlers::room_status))
        .route("/rooms/:room_id/info", get(handlers::room_info))
        // Local track control
        .route(
            "/rooms/:room_id/tracks/:kind",
            post(handlers::set_track_state),
        )
        .route(
            "/rooms/:room_id/tracks/:kind/replace",
            post(handlers::replace_track),
        )
        // Recording control
        .route(
            "/rooms/:room_id/recording/start",
            post(handlers::start_recording),
        )
        .route(
            "/rooms/:room_id/recording/stop",
            post(handlers::stop_recording),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
