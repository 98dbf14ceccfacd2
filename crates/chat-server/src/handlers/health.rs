//! Health check handler.

use axum::{extract::State, Json};

use crate::{models::StatusResponse, state::AppState};

/// Handle health check requests.
pub async fn handle_health(State(state): State<AppState>) -> Json<StatusResponse> {
    tracing::debug!(
        active = state.controller.active_sessions(),
        available = state.controller.available_slots(),
        "health check"
    );
    Json(StatusResponse::ok("Server started"))
}
