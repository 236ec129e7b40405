//! Session output events and channel helpers for redpen.
//!
//! A rewrite session reports everything it does through [`SessionEvent`]s sent
//! over a bounded tokio mpsc channel. The consumer (a window, a terminal view,
//! a test) owns the receiving end.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use core_diff::{DiffStats, StyledSegment};
use tokio::sync::mpsc::{self, Receiver, Sender};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One producer (the session task) and one consumer (the view). The producer awaits on a full
// channel instead of dropping events: diff updates are few (throttled) and every terminal event
// must arrive. A closed channel means the consumer is gone; the producer records the failure and
// stops emitting.
// -------------------------------------------------------------------------------------------------
pub const SESSION_EVENT_CHANNEL_CAP: usize = 256;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters. Inspected by tests and logged once at shutdown by the binary.
// -------------------------------------------------------------------------------------------------
pub static SESSIONS_STARTED: AtomicU64 = AtomicU64::new(0);
pub static SESSIONS_REJECTED: AtomicU64 = AtomicU64::new(0); // start() refused (busy or empty input)
pub static SESSIONS_SETTLED: AtomicU64 = AtomicU64::new(0);
pub static SESSIONS_FAILED: AtomicU64 = AtomicU64::new(0);
pub static SESSIONS_CANCELLED: AtomicU64 = AtomicU64::new(0);
pub static SESSIONS_TIMED_OUT: AtomicU64 = AtomicU64::new(0);
pub static FRAGMENTS_RECEIVED: AtomicU64 = AtomicU64::new(0);
pub static FRAGMENTS_DROPPED: AtomicU64 = AtomicU64::new(0); // arrived outside Streaming
pub static DIFF_RECOMPUTES: AtomicU64 = AtomicU64::new(0); // throttled + final
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub sessions_started: u64,
    pub sessions_rejected: u64,
    pub sessions_settled: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
    pub sessions_timed_out: u64,
    pub fragments_received: u64,
    pub fragments_dropped: u64,
    pub diff_recomputes: u64,
    pub channel_send_failures: u64,
}

impl TelemetrySnapshot {
    pub fn capture() -> Self {
        use Ordering::Relaxed;
        Self {
            sessions_started: SESSIONS_STARTED.load(Relaxed),
            sessions_rejected: SESSIONS_REJECTED.load(Relaxed),
            sessions_settled: SESSIONS_SETTLED.load(Relaxed),
            sessions_failed: SESSIONS_FAILED.load(Relaxed),
            sessions_cancelled: SESSIONS_CANCELLED.load(Relaxed),
            sessions_timed_out: SESSIONS_TIMED_OUT.load(Relaxed),
            fragments_received: FRAGMENTS_RECEIVED.load(Relaxed),
            fragments_dropped: FRAGMENTS_DROPPED.load(Relaxed),
            diff_recomputes: DIFF_RECOMPUTES.load(Relaxed),
            channel_send_failures: CHANNEL_SEND_FAILURES.load(Relaxed),
        }
    }
}

#[inline]
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Monotonic identifier of one rewrite run. Lets a consumer discard events from a run it
/// already abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// User-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential missing or rejected.
    Auth,
    /// Transport failure or non-success status.
    Network,
    /// The service asked us to slow down.
    RateLimit,
    /// Overall time budget exceeded.
    Timeout,
    /// The request could not be built. A programming defect.
    Encoding,
    /// The service answered with something that is not a fragment stream.
    InvalidResponse,
    /// The stream completed without producing any text.
    EmptyResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Encoding => "encoding",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::EmptyResponse => "empty_response",
        }
    }

    /// Only rate limiting suggests that the same request may work later unchanged.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, ErrorKind::RateLimit)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`SessionEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// Fresh merged diff. Fired on each throttled recompute and once more on settle.
    DiffUpdate(Vec<StyledSegment>),
    /// Statistics of the settled diff.
    StatsUpdate(DiffStats),
    /// Terminal failure of the run. Fired at most once per run.
    Error { kind: ErrorKind, message: String },
    /// Final diff delivered; the run is over.
    Settled,
    /// The run was torn down by its owner; nothing else follows.
    Cancelled,
}

impl SessionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEventKind::DiffUpdate(_) => "diff_update",
            SessionEventKind::StatsUpdate(_) => "stats_update",
            SessionEventKind::Error { .. } => "error",
            SessionEventKind::Settled => "settled",
            SessionEventKind::Cancelled => "cancelled",
        }
    }

    /// True for the last event a run emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEventKind::Error { .. } | SessionEventKind::Settled | SessionEventKind::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn new(session: SessionId, kind: SessionEventKind) -> Self {
        Self { session, kind }
    }
}

/// Bounded channel carrying one consumer's session events.
pub fn session_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    mpsc::channel(SESSION_EVENT_CHANNEL_CAP)
}

/// Send one event, awaiting capacity. Returns `false` once the consumer is gone so the caller
/// can stop producing.
pub async fn emit(tx: &Sender<SessionEvent>, event: SessionEvent) -> bool {
    let name = event.kind.name();
    let session = event.session.0;
    if tx.send(event).await.is_err() {
        bump(&CHANNEL_SEND_FAILURES);
        tracing::debug!(target: "session.events", session, event = name, "consumer_gone");
        return false;
    }
    tracing::trace!(target: "session.events", session, event = name, "event_sent");
    true
}
