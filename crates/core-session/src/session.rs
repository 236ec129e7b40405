use std::sync::Arc;
use std::time::Instant;

use core_config::SessionSettings;
use core_diff::{DiffStats, EditScript, StyledSegment, compute_diff, render};
use core_events::{
    DIFF_RECOMPUTES, ErrorKind, FRAGMENTS_DROPPED, FRAGMENTS_RECEIVED, SESSIONS_CANCELLED,
    SESSIONS_FAILED, SESSIONS_REJECTED, SESSIONS_SETTLED, SESSIONS_STARTED, bump,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::accumulator::StreamAccumulator;

/// Lifecycle of one rewrite.
///
/// `Idle -> Streaming -> Finalizing -> Settled`, with `Failed` and `Cancelled`
/// reachable from both active phases. `Failed` and `Cancelled` are recorded in
/// [`RewriteSession::last_terminal`] and the session drops back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Streaming,
    Finalizing,
    Settled,
    Failed,
    Cancelled,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::Settled => "settled",
            SessionPhase::Failed => "failed",
            SessionPhase::Cancelled => "cancelled",
        }
    }

    /// A request is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Streaming | SessionPhase::Finalizing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("a rewrite is already in progress")]
    AlreadyRewriting,
    #[error("nothing to correct: the selected text is empty")]
    EmptyOriginal,
}

/// Final result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub segments: Vec<StyledSegment>,
    pub stats: DiffStats,
    /// The text the final diff was computed against (trimmed when configured).
    pub corrected: String,
}

/// Single-writer state of one rewrite: original text, streamed fragments and
/// the latest diff. All mutation happens through `&mut self`, so whoever owns
/// the session is its only writer.
#[derive(Debug)]
pub struct RewriteSession {
    settings: SessionSettings,
    phase: SessionPhase,
    last_terminal: Option<SessionPhase>,
    original: Arc<str>,
    accumulator: StreamAccumulator,
    script: EditScript,
    corrected: Option<String>,
}

impl RewriteSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            phase: SessionPhase::Idle,
            last_terminal: None,
            original: Arc::from(""),
            accumulator: StreamAccumulator::new(settings.compare_threshold),
            script: EditScript::new(),
            corrected: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_rewriting(&self) -> bool {
        self.phase.is_active()
    }

    /// How the previous run ended, if it ended in `Failed` or `Cancelled`.
    pub fn last_terminal(&self) -> Option<SessionPhase> {
        self.last_terminal
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Shared handle to the original, for handing to a correction service.
    pub fn original_arc(&self) -> Arc<str> {
        Arc::clone(&self.original)
    }

    /// Concatenation of every fragment accepted so far.
    pub fn accumulated(&self) -> &str {
        self.accumulator.text()
    }

    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    /// Script behind the most recent diff (empty before the first recompute).
    pub fn latest_script(&self) -> &EditScript {
        &self.script
    }

    /// Text available for copying once settled.
    pub fn corrected_text(&self) -> Option<&str> {
        match self.phase {
            SessionPhase::Settled => self.corrected.as_deref(),
            _ => None,
        }
    }

    /// Begin a run for `original`. Rejected while a run is active; a settled
    /// session may start again.
    pub fn start(&mut self, original: &str) -> Result<(), StartError> {
        if self.phase.is_active() {
            bump(&SESSIONS_REJECTED);
            warn!(target: "session", phase = self.phase.as_str(), "start_rejected_busy");
            return Err(StartError::AlreadyRewriting);
        }
        if original.trim().is_empty() {
            bump(&SESSIONS_REJECTED);
            debug!(target: "session", "start_rejected_empty");
            return Err(StartError::EmptyOriginal);
        }
        self.original = Arc::from(original);
        self.accumulator = StreamAccumulator::new(self.settings.compare_threshold);
        self.script.clear();
        self.corrected = None;
        self.last_terminal = None;
        bump(&SESSIONS_STARTED);
        info!(
            target: "session",
            original_len = original.len(),
            threshold = self.settings.compare_threshold,
            "rewrite_started"
        );
        self.transition(SessionPhase::Streaming);
        Ok(())
    }

    /// Accept one fragment. Returns fresh segments when the throttle fires.
    /// Fragments arriving outside `Streaming` are dropped.
    pub fn push_fragment(&mut self, fragment: &str) -> Option<Vec<StyledSegment>> {
        if self.phase != SessionPhase::Streaming {
            bump(&FRAGMENTS_DROPPED);
            trace!(target: "session.stream", phase = self.phase.as_str(), "fragment_dropped");
            return None;
        }
        bump(&FRAGMENTS_RECEIVED);
        let fire = self.accumulator.push(fragment);
        trace!(
            target: "session.stream",
            fragment_len = fragment.len(),
            accumulated = self.accumulator.len(),
            pending = self.accumulator.pending(),
            "fragment_accepted"
        );
        if !fire {
            return None;
        }
        let target = self.accumulator.text().to_string();
        let segments = self.recompute(&target);
        self.accumulator.mark_displayed();
        Some(segments)
    }

    /// The stream completed; no further fragments are accepted.
    pub fn begin_finalize(&mut self) -> bool {
        if self.phase != SessionPhase::Streaming {
            return false;
        }
        self.transition(SessionPhase::Finalizing);
        true
    }

    /// Compute the final diff. Returns `None` without an active run. An empty
    /// rewrite fails the run with [`ErrorKind::EmptyResponse`].
    pub fn settle(&mut self) -> Option<Result<Settlement, ErrorKind>> {
        if !self.phase.is_active() {
            return None;
        }
        let accumulated = self.accumulator.text();
        let corrected = if self.settings.trim_settled {
            accumulated.trim().to_string()
        } else {
            accumulated.to_string()
        };
        if corrected.trim().is_empty() {
            self.fail(ErrorKind::EmptyResponse);
            return Some(Err(ErrorKind::EmptyResponse));
        }
        let segments = self.recompute(&corrected);
        self.accumulator.mark_displayed();
        let stats = DiffStats::from_script(&self.script);
        self.corrected = Some(corrected.clone());
        bump(&SESSIONS_SETTLED);
        info!(
            target: "session",
            characters = stats.character_count,
            changes = stats.change_count,
            inserted = stats.inserted,
            deleted = stats.deleted,
            "rewrite_settled"
        );
        self.transition(SessionPhase::Settled);
        Some(Ok(Settlement {
            segments,
            stats,
            corrected,
        }))
    }

    /// Terminal failure. Returns `false` when no run was active.
    pub fn fail(&mut self, kind: ErrorKind) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        bump(&SESSIONS_FAILED);
        warn!(target: "session", error = kind.as_str(), "rewrite_failed");
        self.end(SessionPhase::Failed);
        true
    }

    /// Owner teardown. Returns `false` when no run was active.
    pub fn cancel(&mut self) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        bump(&SESSIONS_CANCELLED);
        info!(target: "session", accumulated = self.accumulator.len(), "rewrite_cancelled");
        self.end(SessionPhase::Cancelled);
        true
    }

    /// Back to `Idle` from any phase, discarding everything (the view was closed).
    pub fn reset(&mut self) {
        self.cancel();
        self.original = Arc::from("");
        self.accumulator = StreamAccumulator::new(self.settings.compare_threshold);
        self.script.clear();
        self.corrected = None;
        self.transition(SessionPhase::Idle);
    }

    fn end(&mut self, terminal: SessionPhase) {
        self.transition(terminal);
        self.last_terminal = Some(terminal);
        self.script.clear();
        self.transition(SessionPhase::Idle);
    }

    fn recompute(&mut self, target: &str) -> Vec<StyledSegment> {
        let started = Instant::now();
        self.script = compute_diff(&self.original, target);
        let segments = render(&self.script);
        bump(&DIFF_RECOMPUTES);
        debug!(
            target: "session.diff",
            old_len = self.original.len(),
            new_len = target.len(),
            segments = segments.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "diff_recomputed"
        );
        segments
    }

    fn transition(&mut self, to: SessionPhase) {
        if self.phase == to {
            return;
        }
        trace!(target: "session", from = self.phase.as_str(), to = to.as_str(), "phase");
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_diff::SegmentKind;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    fn settings(threshold: usize) -> SessionSettings {
        SessionSettings {
            compare_threshold: threshold,
            timeout: Duration::from_secs(30),
            settle_delay: Duration::ZERO,
            trim_settled: true,
        }
    }

    #[test]
    fn throttle_fires_on_fifth_grapheme() {
        let mut session = RewriteSession::new(settings(5));
        session.start("abcdefg").unwrap();
        assert_eq!(session.push_fragment("a"), None);
        assert_eq!(session.push_fragment("b"), None);
        assert_eq!(session.push_fragment("c"), None);
        let segments = session.push_fragment("de").expect("recompute on 5th grapheme");
        assert_eq!(
            segments,
            vec![
                StyledSegment::new(SegmentKind::Equal, "abcde"),
                StyledSegment::new(SegmentKind::Delete, "fg"),
            ]
        );
        assert_eq!(session.accumulator().displayed_len(), 5);
        assert_eq!(session.push_fragment("f"), None);
    }

    #[test]
    fn start_rejections() {
        let mut session = RewriteSession::new(settings(5));
        assert_eq!(session.start("  \n"), Err(StartError::EmptyOriginal));
        assert_eq!(session.phase(), SessionPhase::Idle);
        session.start("x").unwrap();
        assert_eq!(session.start("y"), Err(StartError::AlreadyRewriting));
        assert_eq!(session.original(), "x");
    }

    #[test]
    fn settle_substitution() {
        let original = "今天天氣很好，我想去公圓走走。";
        let mut session = RewriteSession::new(settings(100));
        session.start(original).unwrap();
        for fragment in ["今天天氣", "很好，我想", "去公園走走。"] {
            assert_eq!(session.push_fragment(fragment), None);
        }
        assert!(session.begin_finalize());
        let settlement = session.settle().unwrap().unwrap();
        assert_eq!(
            settlement.segments,
            vec![
                StyledSegment::new(SegmentKind::Equal, "今天天氣很好，我想去公"),
                StyledSegment::new(SegmentKind::Delete, "圓"),
                StyledSegment::new(SegmentKind::Insert, "園"),
                StyledSegment::new(SegmentKind::Equal, "走走。"),
            ]
        );
        assert_eq!(settlement.stats.change_count, 1);
        assert_eq!(settlement.stats.character_count, 15);
        assert_eq!(session.phase(), SessionPhase::Settled);
        assert_eq!(session.corrected_text(), Some("今天天氣很好，我想去公園走走。"));
        // settled only once
        assert_eq!(session.settle(), None);
    }

    #[test]
    fn settle_trims_when_configured() {
        let mut session = RewriteSession::new(settings(100));
        session.start("abc").unwrap();
        session.push_fragment("\nabc\n");
        let settlement = session.settle().unwrap().unwrap();
        assert_eq!(settlement.corrected, "abc");
        assert_eq!(settlement.segments, vec![StyledSegment::new(SegmentKind::Equal, "abc")]);

        let mut raw = RewriteSession::new(SessionSettings {
            trim_settled: false,
            ..settings(100)
        });
        raw.start("abc").unwrap();
        raw.push_fragment("abc\n");
        let settlement = raw.settle().unwrap().unwrap();
        assert_eq!(settlement.corrected, "abc\n");
        assert_eq!(settlement.stats.change_count, 1);
    }

    #[test]
    fn empty_rewrite_fails() {
        let mut session = RewriteSession::new(settings(100));
        session.start("abc").unwrap();
        session.push_fragment("  ");
        session.begin_finalize();
        assert_eq!(session.settle(), Some(Err(ErrorKind::EmptyResponse)));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.last_terminal(), Some(SessionPhase::Failed));
        assert_eq!(session.corrected_text(), None);
    }

    #[test]
    fn fragments_dropped_outside_streaming() {
        let mut session = RewriteSession::new(settings(1));
        assert_eq!(session.push_fragment("a"), None);
        session.start("ab").unwrap();
        session.begin_finalize();
        assert_eq!(session.push_fragment("a"), None);
        assert_eq!(session.accumulated(), "");
    }

    #[test]
    fn cancel_returns_to_idle_and_allows_restart() {
        let mut session = RewriteSession::new(settings(1));
        session.start("ab").unwrap();
        assert!(session.push_fragment("a").is_some());
        assert!(session.cancel());
        assert!(!session.cancel());
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.last_terminal(), Some(SessionPhase::Cancelled));
        assert!(session.latest_script().is_empty());
        session.start("cd").unwrap();
        assert_eq!(session.last_terminal(), None);
        assert_eq!(session.accumulated(), "");
    }

    #[test]
    fn fail_only_from_active_phases() {
        let mut session = RewriteSession::new(settings(1));
        assert!(!session.fail(ErrorKind::Network));
        session.start("ab").unwrap();
        assert!(session.fail(ErrorKind::Network));
        assert_eq!(session.settle(), None);
    }

    #[test]
    fn reset_clears_settled_state() {
        let mut session = RewriteSession::new(settings(1));
        session.start("ab").unwrap();
        session.push_fragment("ab");
        session.settle().unwrap().unwrap();
        session.reset();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.original(), "");
        assert_eq!(session.corrected_text(), None);
    }

    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl Write for LockedWriter<'_> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn logs_lengths_never_text() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(BufferWriter {
                inner: buffer.clone(),
            })
            .finish();

        with_default(subscriber, || {
            let mut session = RewriteSession::new(settings(2));
            session.start("機密文件內容").unwrap();
            session.push_fragment("機密");
            session.push_fragment("檔案內容");
            session.begin_finalize();
            session.settle().unwrap().unwrap();
        });

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("rewrite_started"));
        assert!(log_output.contains("diff_recomputed"));
        assert!(log_output.contains("rewrite_settled"));
        assert!(!log_output.contains("機密"));
        assert!(!log_output.contains("檔案"));
    }
}
