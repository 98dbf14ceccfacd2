//! Application state and configuration.

use chat_runtime::{SessionController, MAX_LENGTH};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs sessions against the shared engine.
    pub controller: Arc<SessionController>,
    /// Server configuration.
    pub config: ServerConfig,
}

/// Server configuration parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Model name reported at startup.
    pub model_name: String,
    /// Address to listen on.
    pub host: String,
    pub port: u16,
    /// Weight quantization level the engine was loaded with (4, 8 or 16 bits).
    pub quantize: u8,
    /// Token budget used when a request does not set one, and the ceiling
    /// requests are clamped to.
    pub max_length: usize,
    /// Maximum concurrent generation sessions.
    pub max_concurrent_sessions: usize,
    /// Append-only session log, if any.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_name: "mock-chat".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5178,
            quantize: 4,
            max_length: MAX_LENGTH,
            max_concurrent_sessions: 1,
            log_file: None,
        }
    }
}
