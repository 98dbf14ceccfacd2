//! Deterministic stand-in for a real generation engine.
//!
//! Used by the server binary until a model backend is wired in, and by the
//! tests of every crate above the engine. Generation is word-by-word over
//! either a fixed script or an echo of the query, and it honours the
//! prompt + output length cap the way a real model does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_engine::{
    DialogueTurn, EngineError, EngineRequest, GenerationEngine, Increment, IncrementStream,
    Result, Tokenizer,
};
use chat_tokenizer::WhitespaceTokenizer;

pub struct MockEngine {
    tokenizer: WhitespaceTokenizer,
    script: Option<Vec<String>>,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    fail_on_start: bool,
    produced: Arc<AtomicUsize>,
    releases: AtomicUsize,
}

impl MockEngine {
    /// Echo engine: answers with "You said:" followed by the query's tokens.
    pub fn new() -> Self {
        Self {
            tokenizer: WhitespaceTokenizer::new(),
            script: None,
            delay: None,
            fail_after: None,
            fail_on_start: false,
            produced: Arc::new(AtomicUsize::new(0)),
            releases: AtomicUsize::new(0),
        }
    }

    /// Answer with these pieces, one per increment, concatenated.
    pub fn with_script<I, S>(mut self, pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script = Some(pieces.into_iter().map(Into::into).collect());
        self
    }

    /// Sleep this long before producing each increment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with an inference error instead of producing increment `n + 1`.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail before producing anything.
    pub fn failing_on_start(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Increments produced across all sessions.
    pub fn produced_count(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    /// Times [`GenerationEngine::release_resources`] was called.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn pieces_for(&self, query: &str) -> Result<Vec<String>> {
        if let Some(script) = &self.script {
            return Ok(script.clone());
        }
        let mut pieces = vec!["You said:".to_string()];
        pieces.extend(
            self.tokenizer
                .tokenize(query)?
                .into_iter()
                .map(|t| format!(" {t}")),
        );
        Ok(pieces)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationEngine for MockEngine {
    fn tokenizer(&self) -> &dyn Tokenizer {
        &self.tokenizer
    }

    fn stream_chat(&self, request: EngineRequest) -> Result<IncrementStream> {
        if self.fail_on_start {
            return Err(EngineError::ModelLoad("mock engine has no weights".to_string()));
        }

        let prompt_tokens = self.tokenizer.token_count(&request.prompt)?;
        // Each piece stands in for one generated token.
        let room = request.max_length.saturating_sub(prompt_tokens);
        let pieces: Vec<String> = self
            .pieces_for(&request.query)?
            .into_iter()
            .take(room)
            .collect();

        Ok(Box::new(MockStream {
            pieces: pieces.into_iter().enumerate(),
            text: request.answer_prefix.clone(),
            request,
            delay: self.delay,
            fail_after: self.fail_after,
            failed: false,
            produced: Arc::clone(&self.produced),
        }))
    }

    fn release_resources(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockStream {
    pieces: std::iter::Enumerate<std::vec::IntoIter<String>>,
    text: String,
    request: EngineRequest,
    delay: Option<Duration>,
    fail_after: Option<usize>,
    failed: bool,
    produced: Arc<AtomicUsize>,
}

impl Iterator for MockStream {
    type Item = Result<Increment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (index, piece) = self.pieces.next()?;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_after == Some(index) {
            self.failed = true;
            return Some(Err(EngineError::Inference(format!(
                "simulated failure at increment {}",
                index + 1
            ))));
        }

        self.text.push_str(&piece);
        self.produced.fetch_add(1, Ordering::SeqCst);

        let mut history = self.request.history.clone();
        history.push(DialogueTurn::new(self.request.query.clone(), self.text.clone()));
        Some(Ok(Increment {
            text: self.text.clone(),
            history,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_engine::{format_prompt, SamplingParams};

    fn request(query: &str, max_length: usize) -> EngineRequest {
        EngineRequest {
            prompt: format_prompt(query, "", &[]),
            query: query.to_string(),
            answer_prefix: String::new(),
            history: Vec::new(),
            max_length,
            sampling: SamplingParams::default(),
        }
    }

    fn texts(engine: &MockEngine, req: EngineRequest) -> Vec<String> {
        engine
            .stream_chat(req)
            .unwrap()
            .map(|inc| inc.unwrap().text)
            .collect()
    }

    #[test]
    fn echoes_query() {
        let engine = MockEngine::new();
        assert_eq!(
            texts(&engine, request("hi there", 2048)),
            vec!["You said:", "You said: hi", "You said: hi there"]
        );
    }

    #[test]
    fn script_pieces_accumulate_after_prefix() {
        let engine = MockEngine::new().with_script(["lo", ", ", "world"]);
        let mut req = request("q", 2048);
        req.answer_prefix = "Hel".to_string();
        assert_eq!(texts(&engine, req), vec!["Hello", "Hello, ", "Hello, world"]);
    }

    #[test]
    fn length_cap_counts_prompt_tokens() {
        let engine = MockEngine::new().with_script(["a", "b", "c", "d"]);
        let req = request("q", 2048);
        let prompt_tokens = engine.tokenizer().token_count(&req.prompt).unwrap();
        let capped = request("q", prompt_tokens + 2);
        assert_eq!(texts(&engine, capped).len(), 2);
        let exhausted = request("q", prompt_tokens);
        assert!(texts(&engine, exhausted).is_empty());
    }

    #[test]
    fn failing_after_yields_error_then_stops() {
        let engine = MockEngine::new().with_script(["a", "b", "c"]).failing_after(1);
        let results: Vec<_> = engine.stream_chat(request("q", 2048)).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(EngineError::Inference(_))));
        assert_eq!(engine.produced_count(), 1);
    }

    #[test]
    fn failing_on_start() {
        let engine = MockEngine::new().failing_on_start();
        assert!(engine.stream_chat(request("q", 2048)).is_err());
    }

    #[test]
    fn release_is_counted() {
        let engine = MockEngine::new();
        engine.release_resources();
        assert_eq!(engine.release_count(), 1);
    }
}
