//! Round-based chat prompt template.
//!
//! ```text
//! [Round 1]
//!
//! 问：<query 1>
//!
//! 答：<response 1>
//!
//! [Round 2]
//!
//! 问：<current query>
//!
//! 答：<answer prefix>
//! ```

use crate::DialogueTurn;

/// Build the full prompt for the current round.
///
/// The prompt ends right after the answer prefix so the model continues it.
pub fn format_prompt(query: &str, answer_prefix: &str, history: &[DialogueTurn]) -> String {
    let mut prompt = String::new();
    for (i, turn) in history.iter().enumerate() {
        prompt.push_str(&format!(
            "[Round {}]\n\n问：{}\n\n答：{}\n\n",
            i + 1,
            turn.query(),
            turn.response()
        ));
    }
    prompt.push_str(&format!(
        "[Round {}]\n\n问：{}\n\n答：{}",
        history.len() + 1,
        query,
        answer_prefix
    ));
    prompt
}
