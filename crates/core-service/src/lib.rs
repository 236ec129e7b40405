//! Correction service boundary.
//!
//! A correction service takes the user's original text and yields the rewritten text as an
//! ordered stream of fragments. Concatenating every fragment gives the full rewrite. Starting the
//! request may fail (credentials, status codes, request encoding) and the stream itself may fail
//! part way (transport); both surface as [`CorrectionError`].
//!
//! Implementations:
//! * [`OpenAiService`]: streaming chat-completions over HTTP (server-sent events).
//! * [`ScriptedService`]: deterministic in-process fragments for tests and demos.
//!
//! No retry or backoff lives here. The session applies one overall timeout and treats every
//! error as terminal.

mod error;
mod openai;
mod request;
mod scripted;
mod sse;

use std::future::Future;
use std::pin::Pin;

use tokio_stream::Stream;

pub use error::CorrectionError;
pub use openai::OpenAiService;
pub use request::{ChatMessage, ChatRequest};
pub use scripted::{ScriptStep, ScriptedService};
pub use sse::{SseDecoder, SseFragmentStream};

/// Ordered rewrite fragments. Ends with `None` on normal completion; an `Err` item is terminal.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, CorrectionError>> + Send>>;

/// A remote (or scripted) text correction backend.
pub trait CorrectionService: Send + Sync + 'static {
    /// Stable identifier for logs.
    fn name(&self) -> &'static str;

    /// Begin correcting `original`. Resolves once the service accepted the request and the
    /// fragment stream is ready to be polled.
    fn correct(
        &self,
        original: &str,
    ) -> impl Future<Output = Result<FragmentStream, CorrectionError>> + Send;
}
