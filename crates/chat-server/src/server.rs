//! Server setup and routing.

use axum::{
    routing::{get, post},
    Router,
};
use chat_runtime::LogRecord;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use crate::{handlers, state::AppState};

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::handle_health))
        .route(
            "/stream",
            post(handlers::stream::handle_stream).get(handlers::stream::handle_stream_query),
        )
        .route("/interrupt", post(handlers::interrupt::handle_interrupt))
        .route("/tokenize", post(handlers::tokenize::handle_tokenize))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let log = state.controller.log().clone();
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log.record(&LogRecord::System("Server started.".to_string()));
    axum::serve(listener, app).await?;
    Ok(())
}
