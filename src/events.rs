//! Stream event listeners.
//!
//! Listeners observe streaming without taking part in it: every [`StreamChunk`] is
//! delivered to each chunk listener right after the caller's own sink, and the final
//! [`StreamComplete`] goes to each completion listener once the stream ends.
//!
//! Listeners run synchronously, in registration order, on the task consuming the
//! stream. Keep them fast; hand heavy work off to a channel.
//!
//! ```rust
//! use claude_conversation::EventListeners;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let listeners = EventListeners::new()
//!     .on_stream_chunk(move |chunk| {
//!         if let Ok(mut seen) = sink.lock() {
//!             seen.push(chunk.index);
//!         }
//!     })
//!     .on_stream_complete(|complete| log::info!("streamed {} bytes", complete.full_text.len()));
//! # let _ = listeners;
//! ```

use crate::types::{StreamChunk, StreamComplete};
use std::sync::Arc;

/// Listener for individual chunks.
pub type ChunkListener = Arc<dyn Fn(&StreamChunk) + Send + Sync>;

/// Listener for the end-of-stream aggregate.
pub type CompleteListener = Arc<dyn Fn(&StreamComplete) + Send + Sync>;

/// Registered stream listeners. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventListeners {
    pub stream_chunk: Vec<ChunkListener>,
    pub stream_complete: Vec<CompleteListener>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stream_chunk<F>(mut self, listener: F) -> Self
    where
        F: Fn(&StreamChunk) + Send + Sync + 'static,
    {
        self.stream_chunk.push(Arc::new(listener));
        self
    }

    pub fn on_stream_complete<F>(mut self, listener: F) -> Self
    where
        F: Fn(&StreamComplete) + Send + Sync + 'static,
    {
        self.stream_complete.push(Arc::new(listener));
        self
    }

    pub fn dispatch_chunk(&self, chunk: &StreamChunk) {
        for listener in &self.stream_chunk {
            listener(chunk);
        }
    }

    pub fn dispatch_complete(&self, complete: &StreamComplete) {
        for listener in &self.stream_complete {
            listener(complete);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stream_chunk.is_empty() && self.stream_complete.is_empty()
    }
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners")
            .field("stream_chunk", &format!("{} listeners", self.stream_chunk.len()))
            .field(
                "stream_complete",
                &format!("{} listeners", self.stream_complete.len()),
            )
            .finish()
    }
}
