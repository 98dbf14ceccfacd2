//! Tokenize handler.

use axum::{extract::State, Json};
use chat_runtime::ChatError;

use crate::{
    error::ServerError,
    models::{TokenizeRequest, TokenizeResponse},
    state::AppState,
};

/// Split text with the engine's tokenizer and report the count.
pub async fn handle_tokenize(
    State(state): State<AppState>,
    Json(req): Json<TokenizeRequest>,
) -> Result<Json<TokenizeResponse>, ServerError> {
    let tokens = state
        .controller
        .engine()
        .tokenizer()
        .tokenize(&req.text)
        .map_err(ChatError::from)?;
    let len = tokens.len();

    Ok(Json(TokenizeResponse {
        tokens: if req.return_tokens { tokens } else { Vec::new() },
        len,
    }))
}
