//! Session audit trail.
//!
//! Provides:
//! - [`LogRecord`]: one line of the audit trail (inputs, output, errors, interrupts)
//! - [`SessionLog`] trait: sink the controller reports to
//! - [`TracingSessionLog`] / [`FileSessionLog`] / [`MemorySessionLog`] /
//!   [`NoopSessionLog`] / [`TeeSessionLog`]: built-in sinks

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chat_engine::{DialogueHistory, SamplingParams};
use serde::Serialize;
use serde_json::json;

use crate::session::SessionId;

/// Request parameters as they are written to the log. Engine handles are
/// never part of this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInputs {
    pub session_id: SessionId,
    pub query: String,
    pub answer_prefix: String,
    pub max_length: usize,
    pub top_p: f32,
    pub temperature: f32,
    pub history: DialogueHistory,
}

impl SessionInputs {
    pub fn new(
        session_id: SessionId,
        query: &str,
        answer_prefix: &str,
        max_length: usize,
        sampling: SamplingParams,
        history: &DialogueHistory,
    ) -> Self {
        Self {
            session_id,
            query: query.to_string(),
            answer_prefix: answer_prefix.to_string(),
            max_length,
            top_p: sampling.top_p,
            temperature: sampling.temperature,
            history: history.clone(),
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// A session started with these parameters.
    Inputs(SessionInputs),
    /// A session finished (naturally or interrupted) with this text.
    Output {
        session_id: SessionId,
        response: String,
    },
    /// A request or session failed.
    Error {
        session_id: Option<SessionId>,
        message: String,
    },
    /// An interrupt fired while `sessions` sessions were running.
    Interrupted { sessions: usize },
    /// Server lifecycle messages.
    System(String),
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Inputs(inputs) => {
                let body = serde_json::to_string(inputs).map_err(|_| fmt::Error)?;
                write!(f, "Inputs {} - {}", inputs.session_id, body)
            }
            LogRecord::Output {
                session_id,
                response,
            } => write!(f, "Output {} - {}", session_id, json!({ "response": response })),
            LogRecord::Error {
                session_id: Some(id),
                message,
            } => write!(f, "Error {}: {}", id, message),
            LogRecord::Error {
                session_id: None,
                message,
            } => write!(f, "Error: {}", message),
            LogRecord::Interrupted { sessions } => {
                write!(f, "Interrupted. ({} running)", sessions)
            }
            LogRecord::System(message) => write!(f, "System - {}", message),
        }
    }
}

/// Sink for audit records. Implementations must not block for long; the
/// controller calls them from the generation loop.
pub trait SessionLog: Send + Sync {
    fn record(&self, record: &LogRecord);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionLog;

impl SessionLog for NoopSessionLog {
    fn record(&self, _record: &LogRecord) {}
}

/// Emits records as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSessionLog;

impl SessionLog for TracingSessionLog {
    fn record(&self, record: &LogRecord) {
        match record {
            LogRecord::Error { .. } => tracing::error!(target: "chat::session", "{record}"),
            _ => tracing::info!(target: "chat::session", "{record}"),
        }
    }
}

/// Append-only text file, one record per line:
/// `<timestamp> - <name> - <record>`.
#[derive(Debug)]
pub struct FileSessionLog {
    name: String,
    file: Mutex<File>,
}

impl FileSessionLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            name: name.into(),
            file: Mutex::new(file),
        })
    }
}

impl SessionLog for FileSessionLog {
    fn record(&self, record: &LogRecord) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{} - {} - {}", timestamp, self.name, record) {
            tracing::warn!("failed to append to session log: {e}");
        }
    }
}

/// Collects records in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Final texts logged for `session_id`.
    pub fn outputs_for(&self, session_id: SessionId) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                LogRecord::Output {
                    session_id: id,
                    response,
                } if id == session_id => Some(response),
                _ => None,
            })
            .collect()
    }
}

impl SessionLog for MemorySessionLog {
    fn record(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Forwards every record to several sinks, in order.
#[derive(Default)]
pub struct TeeSessionLog {
    sinks: Vec<Arc<dyn SessionLog>>,
}

impl TeeSessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn SessionLog>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SessionLog for TeeSessionLog {
    fn record(&self, record: &LogRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
