//! HTTP error handling and response mapping.
//!
//! Errors that happen before generation starts are sent as a single SSE
//! frame, `data: <message>\n\n`, so streaming clients can read them with
//! the same parser they use for responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chat_runtime::ChatError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Chat(#[from] ChatError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Chat(ChatError::QueryTooLarge { .. }) | ServerError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Chat(ChatError::Busy(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Chat(ChatError::Tokenizer(_))
            | ServerError::Chat(ChatError::GenerationEngine { .. })
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// One SSE frame carrying `message` verbatim.
pub fn error_frame(message: &str) -> String {
    // A newline would end the frame early.
    format!("data: {}\n\n", message.replace('\n', " "))
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/event-stream")],
            error_frame(&self.to_string()),
        )
            .into_response()
    }
}
