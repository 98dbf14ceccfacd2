//! Interrupt register.
//!
//! Each running session registers its own [`CancellationToken`]. An
//! untargeted interrupt cancels every registered session, i.e. "stop what is
//! generating now"; a targeted one cancels a single session. Sessions that
//! start after an interrupt get a fresh token, so an interrupt never carries
//! over into the next session.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::session::SessionId;

#[derive(Debug, Default)]
pub struct InterruptRegister {
    active: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl InterruptRegister {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<SessionId, CancellationToken>> {
        // The map stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session and hand back its (uncancelled) token.
    pub fn register(&self, session_id: SessionId) -> CancellationToken {
        let token = CancellationToken::new();
        self.active().insert(session_id, token.clone());
        token
    }

    pub fn deregister(&self, session_id: SessionId) {
        self.active().remove(&session_id);
    }

    /// Stop every running session. Idempotent; returns how many sessions
    /// were registered when the interrupt fired.
    pub fn request_interrupt(&self) -> usize {
        let active = self.active();
        for token in active.values() {
            token.cancel();
        }
        active.len()
    }

    /// Stop one session. Returns `false` if it is not running.
    pub fn interrupt_session(&self, session_id: SessionId) -> bool {
        match self.active().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: SessionId) -> bool {
        self.active().contains_key(&session_id)
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }
}
