//! # chat-runtime
//!
//! Session runtime for the chat stack: trims dialogue history to the token
//! budget, runs cancellable generation sessions against a
//! [`chat_engine::GenerationEngine`], and records an audit trail of every
//! session's inputs and final output.
//!
//! Typical flow:
//!
//! ```text
//! GenerationRequest ──trim_history──▶ GenerationRequest (fits budget)
//!                   ──run_session───▶ SessionRun: Iterator<StreamEvent>
//!                                         Partial*, Final
//! ```

pub mod budget;
pub mod controller;
pub mod error;
pub mod interrupt;
pub mod log;
pub mod mock;
pub mod session;

pub use budget::{fit_history, MAX_LENGTH};
pub use controller::{GenerationRequest, ResponseMode, SessionController, SessionRun, StreamEvent};
pub use error::{ChatError, Result};
pub use interrupt::InterruptRegister;
pub use log::{
    FileSessionLog, LogRecord, MemorySessionLog, NoopSessionLog, SessionInputs, SessionLog,
    TeeSessionLog, TracingSessionLog,
};
pub use mock::MockEngine;
pub use session::{SessionCounter, SessionId};
