//! # chat-tokenizer
//!
//! Token counting for context-window budgeting.
//!
//! This crate provides:
//! - A `Tokenizer` trait, the adapter every generation engine exposes
//! - A reference `WhitespaceTokenizer` for tests and the mock engine
//!
//! Budgeting only needs counts, but the tokenize endpoint also returns the
//! pieces, so the trait is built around `tokenize`.

/// Error type for tokenization operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizerError {
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

/// Core tokenizer trait. Implementations can be swapped without changing app code.
pub trait Tokenizer: Send + Sync {
    /// Split text into the engine's token pieces.
    fn tokenize(&self, text: &str) -> TokenizerResult<Vec<String>>;

    /// Number of tokens `text` occupies in the context window.
    fn token_count(&self, text: &str) -> TokenizerResult<usize> {
        Ok(self.tokenize(text)?.len())
    }
}

impl<T: Tokenizer + ?Sized> Tokenizer for std::sync::Arc<T> {
    fn tokenize(&self, text: &str) -> TokenizerResult<Vec<String>> {
        (**self).tokenize(text)
    }

    fn token_count(&self, text: &str) -> TokenizerResult<usize> {
        (**self).token_count(text)
    }
}

/// Reference tokenizer.
///
/// - Splits on whitespace
/// - Every CJK ideograph and every ASCII punctuation mark is its own token
/// - Stateless and deterministic
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_standalone(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c as u32,
            0x3000..=0x303F     // CJK punctuation
            | 0x3400..=0x4DBF   // CJK extension A
            | 0x4E00..=0x9FFF   // CJK unified ideographs
            | 0xF900..=0xFAFF   // CJK compatibility ideographs
            | 0xFF00..=0xFFEF)  // full-width forms
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> TokenizerResult<Vec<String>> {
        let mut pieces = Vec::new();
        for word in text.split_whitespace() {
            let mut current = String::new();
            for c in word.chars() {
                if is_standalone(c) {
                    if !current.is_empty() {
                        pieces.push(std::mem::take(&mut current));
                    }
                    pieces.push(c.to_string());
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                pieces.push(current);
            }
        }
        Ok(pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_whitespace_simple() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(tok.tokenize("hello world").unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn tokenize_empty_string() {
        let tok = WhitespaceTokenizer::new();
        assert!(tok.tokenize("").unwrap().is_empty());
        assert_eq!(tok.token_count("   ").unwrap(), 0);
    }

    #[test]
    fn tokenize_multiple_spaces() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(tok.token_count("hello    world").unwrap(), 2);
    }

    #[test]
    fn punctuation_splits_off() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(
            tok.tokenize("How are you?").unwrap(),
            vec!["How", "are", "you", "?"]
        );
    }

    #[test]
    fn cjk_characters_count_individually() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(tok.tokenize("你好，世界").unwrap(), vec!["你", "好", "，", "世", "界"]);
    }

    #[test]
    fn mixed_script_word() {
        let tok = WhitespaceTokenizer::new();
        assert_eq!(tok.tokenize("rust语言").unwrap(), vec!["rust", "语", "言"]);
    }

    #[test]
    fn arc_delegates() {
        let tok: std::sync::Arc<dyn Tokenizer> = std::sync::Arc::new(WhitespaceTokenizer::new());
        assert_eq!(tok.token_count("a b c").unwrap(), 3);
    }
}
