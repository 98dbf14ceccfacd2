//! Server-Sent Events (SSE) streaming of session progress.
//!
//! Each partial response is sent as `data: {"response": "<text so far>"}\n\n`.
//! The stream closes after the last partial; an engine failure mid-stream
//! is sent as a final `data: <message>` frame.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use chat_runtime::{SessionRun, StreamEvent};
use futures::stream::Stream;
use tokio::sync::mpsc;

use crate::models::StreamChunk;

/// Stream a running session to the client.
///
/// The session is driven on a blocking worker and handed over one event at
/// a time. When the client disconnects, axum drops the stream, which
/// abandons the session; the worker stops after the current increment and
/// drops the run, releasing its slot without logging an output.
pub fn stream_session(run: SessionRun) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = run.session_id();
    let abandon = run.abandon_on_drop();
    let (tx, mut rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        for event in run {
            if tx.blocking_send(event).is_err() {
                break;
            }
        }
    });

    let stream = async_stream::stream! {
        let _abandon = abandon;

        while let Some(event) = rx.recv().await {
            match event {
                Ok(StreamEvent::Partial { text }) => {
                    match Event::default().json_data(StreamChunk { response: text }) {
                        Ok(frame) => yield Ok(frame),
                        Err(e) => {
                            tracing::error!(%session_id, error = %e, "failed to encode frame");
                            break;
                        }
                    }
                }
                Ok(StreamEvent::Final { .. }) => break,
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "stream ended with an error");
                    yield Ok(Event::default().data(e.to_string().replace('\n', " ")));
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
