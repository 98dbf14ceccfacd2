//! Generation session controller.
//!
//! [`SessionController::run_session`] turns a [`GenerationRequest`] into a
//! [`SessionRun`]: a lazy iterator of [`StreamEvent`]s that drives the
//! engine one increment per step and checks the session's cancellation token
//! between increments.
//!
//! There is a single internal loop ([`SessionRun::step`]); [`ResponseMode`]
//! only decides which of its results reach the caller:
//! - `Streaming`: every increment as `Partial`, then `Final`
//! - `FinalOnly`: just the `Final`
//!
//! `SessionRun::next` blocks while the engine computes. Drive it from a
//! blocking worker, never directly on an async executor.

use std::sync::Arc;

use chat_engine::{
    format_prompt, DialogueHistory, EngineError, EngineRequest, GenerationEngine, Increment,
    IncrementStream, SamplingParams,
};
use tokio::sync::Semaphore;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::budget::{fit_history, MAX_LENGTH};
use crate::error::{ChatError, Result};
use crate::interrupt::InterruptRegister;
use crate::log::{LogRecord, NoopSessionLog, SessionInputs, SessionLog};
use crate::session::{SessionCounter, SessionGuard, SessionId};

/// One incoming generation call. `max_length` is clamped to [`MAX_LENGTH`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    query: String,
    answer_prefix: String,
    history: DialogueHistory,
    max_length: usize,
    sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer_prefix: String::new(),
            history: Vec::new(),
            max_length: MAX_LENGTH,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_answer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.answer_prefix = prefix.into();
        self
    }

    pub fn with_history(mut self, history: DialogueHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.min(MAX_LENGTH);
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn answer_prefix(&self) -> &str {
        &self.answer_prefix
    }

    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }
}

/// What a session emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Progress; the response so far. Streaming mode only.
    Partial { text: String },
    /// Always last, exactly once per session.
    Final {
        text: String,
        history: DialogueHistory,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Streaming,
    FinalOnly,
}

/// Owns the engine and everything sessions share: the id counter, the
/// interrupt register, the session slots and the audit log.
pub struct SessionController {
    engine: Arc<dyn GenerationEngine>,
    counter: Arc<SessionCounter>,
    interrupts: Arc<InterruptRegister>,
    slots: Arc<Semaphore>,
    max_sessions: usize,
    log: Arc<dyn SessionLog>,
}

impl SessionController {
    /// Controller with one session slot, a fresh counter and no audit log.
    pub fn new(engine: Arc<dyn GenerationEngine>) -> Self {
        Self {
            engine,
            counter: Arc::new(SessionCounter::new()),
            interrupts: Arc::new(InterruptRegister::new()),
            slots: Arc::new(Semaphore::new(1)),
            max_sessions: 1,
            log: Arc::new(NoopSessionLog),
        }
    }

    /// Allow `n` sessions to use the engine at once. Only raise this for
    /// engines that are safe to share.
    pub fn with_max_sessions(mut self, n: usize) -> Self {
        let n = n.max(1);
        self.slots = Arc::new(Semaphore::new(n));
        self.max_sessions = n;
        self
    }

    pub fn with_counter(mut self, counter: Arc<SessionCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_interrupts(mut self, interrupts: Arc<InterruptRegister>) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn SessionLog>) -> Self {
        self.log = log;
        self
    }

    pub fn engine(&self) -> &Arc<dyn GenerationEngine> {
        &self.engine
    }

    pub fn log(&self) -> &Arc<dyn SessionLog> {
        &self.log
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn active_sessions(&self) -> usize {
        self.interrupts.active_count()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Drop the oldest history turns until the request fits its budget,
    /// using the engine's tokenizer.
    pub fn trim_history(&self, request: GenerationRequest) -> Result<GenerationRequest> {
        let history = fit_history(
            self.engine.tokenizer(),
            &request.query,
            &request.answer_prefix,
            &request.history,
            request.max_length,
        )?;
        Ok(request.with_history(history))
    }

    /// Stop every running session.
    pub fn request_interrupt(&self) -> usize {
        let sessions = self.interrupts.request_interrupt();
        self.log.record(&LogRecord::Interrupted { sessions });
        sessions
    }

    /// Stop one session; `false` if it is not running.
    pub fn interrupt_session(&self, session_id: SessionId) -> bool {
        let found = self.interrupts.interrupt_session(session_id);
        if found {
            self.log.record(&LogRecord::Interrupted { sessions: 1 });
        }
        found
    }

    /// Start a session. `request.history` must already fit the budget
    /// (see [`Self::trim_history`]); `max_length` is forwarded to the engine
    /// as its length cap.
    ///
    /// Fails with [`ChatError::Busy`] before any id is allocated when every
    /// slot is taken.
    pub fn run_session(&self, request: GenerationRequest, mode: ResponseMode) -> Result<SessionRun> {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| ChatError::Busy(self.max_sessions))?;

        let session_id = self.counter.next_id();
        let guard = SessionGuard::register(
            session_id,
            Arc::clone(&self.interrupts),
            Arc::clone(&self.engine),
            permit,
        );

        self.log.record(&LogRecord::Inputs(SessionInputs::new(
            session_id,
            &request.query,
            &request.answer_prefix,
            request.max_length,
            request.sampling,
            &request.history,
        )));

        let engine_request = EngineRequest {
            prompt: format_prompt(&request.query, &request.answer_prefix, &request.history),
            query: request.query,
            answer_prefix: request.answer_prefix,
            history: request.history.clone(),
            max_length: request.max_length,
            sampling: request.sampling,
        };

        let stream = match self.engine.stream_chat(engine_request) {
            Ok(stream) => stream,
            Err(source) => {
                self.log.record(&LogRecord::Error {
                    session_id: Some(session_id),
                    message: source.to_string(),
                });
                // Releases the slot and the engine's working memory.
                drop(guard);
                return Err(ChatError::GenerationEngine { session_id, source });
            }
        };

        tracing::info!(%session_id, ?mode, "session started");
        Ok(SessionRun {
            session_id,
            mode,
            cancel: guard.cancellation_token(),
            abandoned: CancellationToken::new(),
            stream: Some(stream),
            request_history: request.history.clone(),
            last: Increment {
                text: String::new(),
                history: request.history,
            },
            increments: 0,
            finished: false,
            log: Arc::clone(&self.log),
            guard: Some(guard),
        })
    }
}

/// A running session. Yields `Partial` events (streaming mode) and then one
/// `Final`, or a single `Err` if the engine fails; `None` afterwards.
///
/// Dropping it early (e.g. the client went away) cancels the session and
/// releases its resources without logging an output. When the run is being
/// driven elsewhere, [`SessionRun::abandon_on_drop`] does the same from the
/// consumer's side.
pub struct SessionRun {
    session_id: SessionId,
    mode: ResponseMode,
    cancel: CancellationToken,
    abandoned: CancellationToken,
    // Dropped before `guard`, so the engine stream is gone by the time
    // the engine is asked to release resources.
    stream: Option<IncrementStream>,
    request_history: DialogueHistory,
    last: Increment,
    increments: usize,
    finished: bool,
    log: Arc<dyn SessionLog>,
    guard: Option<SessionGuard>,
}

impl SessionRun {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Token that is cancelled by an interrupt aimed at this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Guard held by whoever waits for this run's output. Dropping it
    /// abandons the session: the loop stops after the current increment,
    /// no `Final` is produced and no output is logged. Disarm it once the
    /// output has been delivered.
    pub fn abandon_on_drop(&self) -> DropGuard {
        self.abandoned.clone().drop_guard()
    }

    /// Drive the session to the end and return the final text and history.
    ///
    /// A run that was already drained or abandoned yields empty text and the
    /// request's history.
    pub fn into_final(self) -> Result<(String, DialogueHistory)> {
        let fallback = self.request_history.clone();
        for event in self {
            if let StreamEvent::Final { text, history } = event? {
                return Ok((text, history));
            }
        }
        Ok((String::new(), fallback))
    }

    /// Advance the engine by one increment. `Ok(None)` means the loop is
    /// over, either because the engine is exhausted or because the session
    /// was cancelled after the previous increment.
    fn step(&mut self) -> std::result::Result<Option<String>, EngineError> {
        if self.cancel.is_cancelled() {
            tracing::debug!(
                session_id = %self.session_id,
                increments = self.increments,
                "session interrupted"
            );
            return Ok(None);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next() {
            Some(Ok(increment)) => {
                let text = increment.text.clone();
                self.last = increment;
                self.increments += 1;
                Ok(Some(text))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.finished = true;
        self.stream = None;
        self.guard = None;
    }

    fn finish(&mut self) -> StreamEvent {
        self.close();
        let Increment { text, history } = std::mem::replace(
            &mut self.last,
            Increment {
                text: String::new(),
                history: Vec::new(),
            },
        );
        self.log.record(&LogRecord::Output {
            session_id: self.session_id,
            response: text.clone(),
        });
        tracing::info!(
            session_id = %self.session_id,
            increments = self.increments,
            "session finished"
        );
        StreamEvent::Final { text, history }
    }

    fn fail(&mut self, source: EngineError) -> ChatError {
        self.close();
        self.log.record(&LogRecord::Error {
            session_id: Some(self.session_id),
            message: source.to_string(),
        });
        ChatError::GenerationEngine {
            session_id: self.session_id,
            source,
        }
    }
}

impl Iterator for SessionRun {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.abandoned.is_cancelled() {
                self.close();
                tracing::debug!(
                    session_id = %self.session_id,
                    increments = self.increments,
                    "session abandoned by its consumer"
                );
                return None;
            }
            match self.step() {
                Ok(Some(text)) => {
                    if self.mode == ResponseMode::Streaming {
                        return Some(Ok(StreamEvent::Partial { text }));
                    }
                }
                Ok(None) => return Some(Ok(self.finish())),
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
    }
}

impl Drop for SessionRun {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(session_id = %self.session_id, "session abandoned before completion");
        }
    }
}
