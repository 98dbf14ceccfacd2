//! Tokenize endpoint types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TokenizeRequest {
    pub text: String,
    /// Include the token pieces, not just their count.
    #[serde(default)]
    pub return_tokens: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenizeResponse {
    /// Empty unless `return_tokens` was set.
    pub tokens: Vec<String>,
    pub len: usize,
}
