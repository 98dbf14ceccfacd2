//! HTTP request handlers for API endpoints.

pub mod health;
pub mod interrupt;
pub mod stream;
pub mod tokenize;

pub use health::handle_health;
pub use interrupt::handle_interrupt;
pub use stream::{handle_stream, handle_stream_query};
pub use tokenize::handle_tokenize;
