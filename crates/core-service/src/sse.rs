//! Server-sent-events decoding for streaming chat completions.
//!
//! Wire shape (one event per `data:` line, blank lines between events):
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"今天"}}]}
//!
//! data: [DONE]
//! ```
//!
//! * Bytes arrive in arbitrary chunks; a line (and a multi-byte UTF-8 sequence)
//!   may straddle chunk boundaries. Only complete lines are decoded.
//! * `[DONE]` ends the stream; anything after it is ignored.
//! * Deltas without content (role announcements, finish markers), comments
//!   (`:` lines), other fields (`event:`, `id:`) and undecodable JSON are skipped.
//! * A payload carrying an `error` object is a terminal failure.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Deserialize;
use tokio_stream::Stream;
use tracing::{debug, trace};

use crate::CorrectionError;

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

/// Incremental byte-to-fragment decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk; returns fragments from every line completed by it.
    ///
    /// An error ends the stream: fragments decoded earlier in the same chunk
    /// are discarded with it and later pushes yield nothing.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, CorrectionError> {
        if self.done {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(rel) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + rel;
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.scanned = 0;
            match self.consume_line(&line[..line.len() - 1], &mut out) {
                Ok(false) => {}
                Ok(true) => {
                    self.buf.clear();
                    break;
                }
                Err(e) => {
                    self.done = true;
                    self.buf.clear();
                    return Err(e);
                }
            }
        }
        self.scanned = self.buf.len();
        Ok(out)
    }

    /// End of input: decode a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Vec<String>, CorrectionError> {
        let mut out = Vec::new();
        if !self.done && !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.consume_line(&line, &mut out)?;
        }
        self.buf.clear();
        self.scanned = 0;
        Ok(out)
    }

    /// Returns `true` when the line was the done marker.
    fn consume_line(&mut self, raw: &[u8], out: &mut Vec<String>) -> Result<bool, CorrectionError> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = std::str::from_utf8(raw)
            .map_err(|e| CorrectionError::InvalidResponse(format!("stream is not UTF-8: {e}")))?;
        match decode_line(line)? {
            SseLine::Fragment(fragment) => {
                out.push(fragment);
                Ok(false)
            }
            SseLine::Done => {
                trace!(target: "service.sse", "done_marker");
                self.done = true;
                Ok(true)
            }
            SseLine::Skip => Ok(false),
        }
    }
}

fn decode_line(line: &str) -> Result<SseLine, CorrectionError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    if data == DONE_MARKER {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(target: "service.sse", data_len = data.len(), error = %e, "undecodable_chunk_skipped");
            return Ok(SseLine::Skip);
        }
    };
    if let Some(err) = payload.error {
        return Err(CorrectionError::Network {
            status: None,
            message: err.message,
        });
    }
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());
    Ok(content.map_or(SseLine::Skip, SseLine::Fragment))
}

/// Adapts a byte-chunk stream (e.g. an HTTP body) into a fragment stream.
pub struct SseFragmentStream<S> {
    inner: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseFragmentStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Box::pin(inner),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, B, E> Stream for SseFragmentStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = Result<String, CorrectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    match this.decoder.push(chunk.as_ref()) {
                        Ok(fragments) => this.pending.extend(fragments),
                        Err(e) => {
                            this.finished = true;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                    if this.decoder.is_done() {
                        this.finished = true;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(CorrectionError::transport(e))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    match this.decoder.finish() {
                        Ok(fragments) => this.pending.extend(fragments),
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    }
                }
            }
        }
    }
}
