//! # chat-engine
//!
//! The "narrow waist" between the session controller and whatever actually
//! generates text. Defines the [`GenerationEngine`] trait and the dialogue
//! data model every other crate depends on. Backends (a quantized local model,
//! a remote service, the mock in `chat-runtime`) plug in here without the
//! controller or the server changing.
//!
//! ## Design Notes
//!
//! ### Lazy output
//! [`GenerationEngine::stream_chat`] returns a boxed iterator. Each `next()`
//! call is one increment of generation and may block for as long as the
//! forward pass takes, so consumers drive it from a blocking worker. A
//! consumer that stops calling `next()` stops generation; nothing is
//! produced ahead of demand.
//!
//! ### Shared access
//! Methods take `&self` so one engine instance can sit behind an `Arc`.
//! Whether concurrent sessions may share it is decided by the caller (the
//! runtime serializes access with session slots).

use serde::{Deserialize, Serialize};

mod prompt;

pub use chat_tokenizer::{Tokenizer, TokenizerError, TokenizerResult};
pub use prompt::format_prompt;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Tokenization failed: {0}")]
    Tokenization(#[from] TokenizerError),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// One completed exchange. Immutable once built.
///
/// Serialized as a two-element array `[query, response]`, the shape clients
/// send history in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct DialogueTurn {
    query: String,
    response: String,
}

impl DialogueTurn {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn response(&self) -> &str {
        &self.response
    }
}

impl From<(String, String)> for DialogueTurn {
    fn from((query, response): (String, String)) -> Self {
        Self { query, response }
    }
}

impl From<DialogueTurn> for (String, String) {
    fn from(turn: DialogueTurn) -> Self {
        (turn.query, turn.response)
    }
}

/// Prior exchanges, oldest first.
pub type DialogueHistory = Vec<DialogueTurn>;

/// Sampling knobs forwarded verbatim to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_p: 0.7,
            temperature: 1.0,
        }
    }
}

/// Everything the engine needs for one generation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// Fully formatted prompt (see [`format_prompt`]).
    pub prompt: String,
    /// The current round's query.
    pub query: String,
    /// Text the answer is forced to start with; may be empty.
    pub answer_prefix: String,
    /// Trimmed history the prompt was built from.
    pub history: DialogueHistory,
    /// Hard cap on prompt + generated tokens.
    pub max_length: usize,
    pub sampling: SamplingParams,
}

/// One unit of partial output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    /// The response so far (cumulative, answer prefix included).
    pub text: String,
    /// Request history with `(query, text)` appended.
    pub history: DialogueHistory,
}

/// Lazy, finite sequence of increments.
pub type IncrementStream = Box<dyn Iterator<Item = Result<Increment>> + Send>;

/// The core engine trait. Everything else plugs into this.
pub trait GenerationEngine: Send + Sync {
    /// Tokenizer used both for budgeting and by the model itself.
    fn tokenizer(&self) -> &dyn Tokenizer;

    /// Start generating. Errors here mean nothing was produced; errors
    /// yielded by the stream mean generation failed part-way.
    fn stream_chat(&self, request: EngineRequest) -> Result<IncrementStream>;

    /// Release working memory (KV cache, accelerator scratch space).
    ///
    /// Called once after every session, however it ended.
    fn release_resources(&self) {}
}
