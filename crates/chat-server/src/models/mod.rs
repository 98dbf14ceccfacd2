//! Request/response types.

pub mod common;
pub mod stream;
pub mod tokenize;

pub use common::StatusResponse;
pub use stream::{StreamChunk, StreamQueryParams, StreamRequest};
pub use tokenize::{TokenizeRequest, TokenizeResponse};
