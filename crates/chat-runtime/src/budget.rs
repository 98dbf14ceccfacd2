//! Context-window budgeting.
//!
//! The prompt sent to the engine is history + query + answer prefix, and the
//! engine's length cap covers prompt and output together. Trimming keeps the
//! most recent turns that fit strictly under the budget and drops the rest.

use chat_engine::{DialogueHistory, DialogueTurn, Tokenizer};

use crate::error::{ChatError, Result};

/// System-wide ceiling on the token budget of a single request.
pub const MAX_LENGTH: usize = 2048;

/// Trim `history` so history + query + prefix uses fewer than `max_tokens`.
///
/// Scans from the newest turn backwards and stops at the first turn that
/// does not fit; that turn and everything older is dropped, even if an older
/// turn would fit on its own. The result keeps chronological order.
///
/// Fails with [`ChatError::QueryTooLarge`] when query + prefix alone reaches
/// the budget.
pub fn fit_history(
    tokenizer: &dyn Tokenizer,
    query: &str,
    answer_prefix: &str,
    history: &[DialogueTurn],
    max_tokens: usize,
) -> Result<DialogueHistory> {
    let query_tokens = tokenizer.token_count(&format!("{query}{answer_prefix}"))?;
    if query_tokens >= max_tokens {
        return Err(ChatError::QueryTooLarge {
            tokens: query_tokens,
            budget: max_tokens,
        });
    }

    let mut used = query_tokens;
    let mut kept = 0;
    for turn in history.iter().rev() {
        let item_tokens =
            tokenizer.token_count(&format!("{}{}", turn.query(), turn.response()))?;
        if item_tokens + used >= max_tokens {
            break;
        }
        used += item_tokens;
        kept += 1;
    }

    Ok(history[history.len() - kept..].to_vec())
}
