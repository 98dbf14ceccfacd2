//! Generation request types and the streamed chunk.

use chat_engine::{DialogueHistory, SamplingParams};
use chat_runtime::GenerationRequest;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Generation request, as a JSON body.
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub query: String,
    #[serde(default)]
    pub answer_prefix: String,
    pub max_length: Option<usize>,
    /// `[[query, response], ...]`, oldest first.
    #[serde(default)]
    pub history: DialogueHistory,
    /// Stream partial responses as SSE; otherwise reply once with plain text.
    #[serde(default)]
    pub stream: bool,
    pub top_p: Option<f32>,
    pub temperature: Option<f32>,
}

impl StreamRequest {
    /// Build the runtime request, applying defaults and the length ceiling.
    pub fn into_generation_request(self, max_length: usize) -> GenerationRequest {
        let defaults = SamplingParams::default();
        GenerationRequest::new(self.query)
            .with_answer_prefix(self.answer_prefix)
            .with_history(self.history)
            .with_max_length(self.max_length.unwrap_or(max_length).min(max_length))
            .with_sampling(SamplingParams {
                top_p: self.top_p.unwrap_or(defaults.top_p),
                temperature: self.temperature.unwrap_or(defaults.temperature),
            })
    }
}

/// Generation request, as query parameters. `history` is a JSON-encoded
/// list of pairs.
#[derive(Debug, Deserialize)]
pub struct StreamQueryParams {
    pub query: String,
    #[serde(default)]
    pub answer_prefix: String,
    pub max_length: Option<usize>,
    pub history: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub top_p: Option<f32>,
    pub temperature: Option<f32>,
}

impl TryFrom<StreamQueryParams> for StreamRequest {
    type Error = ServerError;

    fn try_from(params: StreamQueryParams) -> Result<Self, Self::Error> {
        let history = match params.history.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| ServerError::InvalidRequest(format!("history: {e}")))?,
        };
        Ok(StreamRequest {
            query: params.query,
            answer_prefix: params.answer_prefix,
            max_length: params.max_length,
            history,
            stream: params.stream,
            top_p: params.top_p,
            temperature: params.temperature,
        })
    }
}

/// Payload of one streamed frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The response so far.
    pub response: String,
}
