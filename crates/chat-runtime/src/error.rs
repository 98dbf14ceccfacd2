//! Error types for session runtime operations.

use chat_engine::{EngineError, TokenizerError};

use crate::session::SessionId;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The query plus answer prefix alone does not fit the budget.
    #[error("query too large: {tokens} tokens does not fit a budget of {budget}")]
    QueryTooLarge { tokens: usize, budget: usize },

    #[error("session {session_id}: generation failed: {source}")]
    GenerationEngine {
        session_id: SessionId,
        #[source]
        source: EngineError,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("server busy: all {0} session slots in use")]
    Busy(usize),
}

impl ChatError {
    /// Session the error belongs to, if one had been allocated.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ChatError::GenerationEngine { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }
}
