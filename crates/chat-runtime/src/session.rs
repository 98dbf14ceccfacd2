//! Session identity and lifecycle.
//!
//! Every generation call gets a [`SessionId`] from a process-wide
//! [`SessionCounter`] and holds a [`SessionGuard`] for as long as its
//! generation loop runs. Dropping the guard cancels the session, removes it
//! from the interrupt register, tells the engine to release working memory
//! and frees the session slot, whichever way the loop ended.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_engine::GenerationEngine;
use serde::Serialize;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::interrupt::InterruptRegister;

/// Identifier of one generation attempt. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic session id source. Ids start at 1.
#[derive(Debug)]
pub struct SessionCounter {
    first: u64,
    next: AtomicU64,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Counter whose first id is `first` (e.g. to continue after a restart).
    pub fn starting_at(first: u64) -> Self {
        Self {
            first,
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - self.first
    }
}

impl Default for SessionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases session resources when dropped.
pub(crate) struct SessionGuard {
    session_id: SessionId,
    cancel: CancellationToken,
    interrupts: Arc<InterruptRegister>,
    engine: Arc<dyn GenerationEngine>,
    _permit: OwnedSemaphorePermit,
}

impl SessionGuard {
    /// Register `session_id` and return its guard.
    pub(crate) fn register(
        session_id: SessionId,
        interrupts: Arc<InterruptRegister>,
        engine: Arc<dyn GenerationEngine>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let cancel = interrupts.register(session_id);
        Self {
            session_id,
            cancel,
            interrupts,
            engine,
            _permit: permit,
        }
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Anyone still holding the token sees the session as over.
        self.cancel.cancel();
        self.interrupts.deregister(self.session_id);
        self.engine.release_resources();
        tracing::debug!(session_id = %self.session_id, "session resources released");
    }
}
