//! Generation handler.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use chat_runtime::{GenerationRequest, LogRecord, ResponseMode, SessionRun};

use crate::{
    error::ServerError,
    models::{StreamQueryParams, StreamRequest},
    state::AppState,
    streaming::stream_session,
};

/// Header carrying the id of the session that served the request.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Handle `POST /stream` with a JSON body.
pub async fn handle_stream(
    State(state): State<AppState>,
    body: Result<Json<StreamRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let req = body
        .map(|Json(req)| req)
        .map_err(|rejection| ServerError::InvalidRequest(rejection.body_text()))
        .map_err(|e| rejected(&state, e))?;
    respond(state, req).await
}

/// Handle `GET /stream` with the request in query parameters.
pub async fn handle_stream_query(
    State(state): State<AppState>,
    params: Result<Query<StreamQueryParams>, QueryRejection>,
) -> Result<Response, ServerError> {
    let req = params
        .map_err(|rejection| ServerError::InvalidRequest(rejection.body_text()))
        .and_then(|Query(params)| StreamRequest::try_from(params))
        .map_err(|e| rejected(&state, e))?;
    respond(state, req).await
}

/// Log a request turned away before any session started.
fn rejected(state: &AppState, err: ServerError) -> ServerError {
    tracing::warn!(error = %err, "request rejected");
    state.controller.log().record(&LogRecord::Error {
        session_id: None,
        message: err.to_string(),
    });
    err
}

async fn respond(state: AppState, req: StreamRequest) -> Result<Response, ServerError> {
    let mode = if req.stream {
        ResponseMode::Streaming
    } else {
        ResponseMode::FinalOnly
    };
    let request = req.into_generation_request(state.config.max_length);
    let run = start_session(&state, request, mode)?;
    let session_id = run.session_id().to_string();

    match mode {
        ResponseMode::Streaming => {
            Ok(([(SESSION_ID_HEADER, session_id)], stream_session(run)).into_response())
        }
        ResponseMode::FinalOnly => {
            // Dropped with this future if the client goes away first.
            let abandon = run.abandon_on_drop();
            let (text, _history) = tokio::task::spawn_blocking(move || run.into_final())
                .await
                .map_err(|e| ServerError::Internal(format!("generation worker failed: {e}")))??;
            let _ = abandon.disarm();
            Ok(([(SESSION_ID_HEADER, session_id)], text).into_response())
        }
    }
}

/// Trim the history and open a session. Failures that happen before a
/// session exists are logged through [`rejected`]; the controller logs its own.
fn start_session(
    state: &AppState,
    request: GenerationRequest,
    mode: ResponseMode,
) -> Result<SessionRun, ServerError> {
    let controller = &state.controller;
    let started = controller
        .trim_history(request)
        .and_then(|request| controller.run_session(request, mode));

    match started {
        Err(e) if e.session_id().is_none() => Err(rejected(state, e.into())),
        started => started.map_err(ServerError::from),
    }
}
