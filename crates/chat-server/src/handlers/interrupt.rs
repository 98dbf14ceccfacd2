//! Interrupt handler.

use axum::{
    extract::{Query, State},
    Json,
};
use chat_runtime::SessionId;
use serde::Deserialize;

use crate::{models::StatusResponse, state::AppState};

#[derive(Debug, Deserialize)]
pub struct InterruptParams {
    /// Stop only this session; without it every running session stops.
    pub session_id: Option<u64>,
}

/// Stop the running generation(s) after their current increment.
pub async fn handle_interrupt(
    State(state): State<AppState>,
    Query(params): Query<InterruptParams>,
) -> Json<StatusResponse> {
    match params.session_id {
        None => {
            state.controller.request_interrupt();
            Json(StatusResponse::ok("OK"))
        }
        Some(id) => {
            if state.controller.interrupt_session(SessionId::from(id)) {
                Json(StatusResponse::ok("OK"))
            } else {
                Json(StatusResponse::failed(format!("session {id} is not running")))
            }
        }
    }
}
