//! # chat-server
//!
//! HTTP front-end for the chat session runtime.
//!
//! Exposes [`chat_runtime::SessionController`] through a small REST API:
//! streaming generation over Server-Sent Events (SSE) or as a single
//! plain-text body, an interrupt endpoint, a tokenize endpoint and a status
//! endpoint.

pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod state;
pub mod streaming;

pub use error::ServerError;
pub use server::{create_router, run_server};
pub use state::{AppState, ServerConfig};
