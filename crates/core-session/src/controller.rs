use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use core_config::SessionSettings;
use core_events::{
    CHANNEL_SEND_FAILURES, ErrorKind, SESSIONS_REJECTED, SESSIONS_TIMED_OUT, SessionEvent,
    SessionEventKind, SessionId, bump, emit,
};
use core_service::{CorrectionError, CorrectionService};
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_stream::StreamExt;
use tracing::{Instrument, debug, error, info, warn};

use crate::session::{RewriteSession, StartError};

/// Owner side of a run's cancellation signal. Only [`signal`](Self::signal)
/// cancels; dropping the handle detaches the run, which then finishes and
/// delivers its terminal event on its own.
#[derive(Debug)]
struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    fn signal(&self) {
        self.tx.send_replace(true);
    }
}

/// Level-triggered: once signalled, every later wait resolves immediately.
#[derive(Debug, Clone)]
struct CancelListener {
    rx: watch::Receiver<bool>,
}

impl CancelListener {
    fn new_pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelListener { rx })
    }

    async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Detached: the handle is gone without a signal.
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    ConsumerGone,
}

impl RunOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timed_out",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::ConsumerGone => "consumer_gone",
        }
    }
}

/// Why an event could not be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stop {
    Cancelled,
    ConsumerGone,
}

impl From<Stop> for RunOutcome {
    fn from(stop: Stop) -> Self {
        match stop {
            Stop::Cancelled => RunOutcome::Cancelled,
            Stop::ConsumerGone => RunOutcome::ConsumerGone,
        }
    }
}

struct ActiveRun {
    id: SessionId,
    cancel: CancelHandle,
    done: Arc<AtomicBool>,
    handle: JoinHandle<RewriteSession>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        !self.done.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

/// Drives one rewrite at a time against a correction service and reports
/// progress as [`SessionEvent`]s.
///
/// Each run owns a fresh [`RewriteSession`] inside its own tokio task; the
/// controller only keeps the task handle and its cancellation signal.
pub struct SessionController<S: CorrectionService> {
    service: Arc<S>,
    settings: SessionSettings,
    events: Sender<SessionEvent>,
    next_id: u64,
    active: Option<ActiveRun>,
}

impl<S: CorrectionService> SessionController<S> {
    pub fn new(service: Arc<S>, settings: SessionSettings, events: Sender<SessionEvent>) -> Self {
        Self {
            service,
            settings,
            events,
            next_id: 1,
            active: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// A run is in flight and has not yet emitted its terminal event.
    pub fn is_rewriting(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveRun::is_running)
    }

    /// Identifier of the most recently started run.
    pub fn current(&self) -> Option<SessionId> {
        self.active.as_ref().map(|run| run.id)
    }

    /// Start correcting `original`. Must be called from within a tokio runtime.
    pub fn start(&mut self, original: &str) -> Result<SessionId, StartError> {
        if self.is_rewriting() {
            bump(&SESSIONS_REJECTED);
            warn!(
                target: "session",
                active = self.current().map(|id| id.0),
                "start_rejected_busy"
            );
            return Err(StartError::AlreadyRewriting);
        }
        let mut session = RewriteSession::new(self.settings);
        session.start(original)?;

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let (cancel, listener) = CancelListener::new_pair();
        let done = Arc::new(AtomicBool::new(false));
        let task = RunTask {
            id,
            session,
            service: Arc::clone(&self.service),
            events: self.events.clone(),
            cancel: listener,
            done: Arc::clone(&done),
        };
        let span = tracing::debug_span!(target: "session", "rewrite_run", session = id.0);
        let handle = tokio::spawn(task.run().instrument(span));
        // A previous run that is past its terminal event may still be waiting
        // for channel capacity; replacing it detaches it without cancelling.
        self.active = Some(ActiveRun {
            id,
            cancel,
            done,
            handle,
        });
        debug!(target: "session", session = id.0, service = self.service.name(), "run_spawned");
        Ok(id)
    }

    /// Tear down the current run. Once this returns the run emits nothing
    /// further apart from its `Cancelled` notice. Returns the run's final
    /// session state.
    pub async fn cancel(&mut self) -> Option<RewriteSession> {
        let run = self.active.take()?;
        run.cancel.signal();
        Self::join_run(run.handle).await
    }

    /// Wait for the current run to finish on its own.
    pub async fn join(&mut self) -> Option<RewriteSession> {
        let run = self.active.take()?;
        Self::join_run(run.handle).await
    }

    async fn join_run(handle: JoinHandle<RewriteSession>) -> Option<RewriteSession> {
        match handle.await {
            Ok(session) => Some(session),
            Err(join_err) => {
                error!(target: "session", ?join_err, "run_join_failed");
                None
            }
        }
    }
}

impl<S: CorrectionService> Drop for SessionController<S> {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancel.signal();
        }
    }
}

struct RunTask<S: CorrectionService> {
    id: SessionId,
    session: RewriteSession,
    service: Arc<S>,
    events: Sender<SessionEvent>,
    cancel: CancelListener,
    done: Arc<AtomicBool>,
}

impl<S: CorrectionService> RunTask<S> {
    async fn run(mut self) -> RewriteSession {
        let timeout = self.session.settings().timeout;
        let deadline = Instant::now() + timeout;
        let outcome = match self.stream(deadline).await {
            Ok(()) => self.finalize().await,
            Err(RunFailure::Service(err)) => {
                self.fail(err.kind(), err.to_string()).await;
                RunOutcome::Failed
            }
            Err(RunFailure::TimedOut) => {
                bump(&SESSIONS_TIMED_OUT);
                warn!(target: "session", timeout_ms = timeout.as_millis() as u64, "rewrite_timed_out");
                let err = CorrectionError::Timeout(timeout);
                self.fail(err.kind(), err.to_string()).await;
                RunOutcome::TimedOut
            }
            Err(RunFailure::Stopped(stop)) => stop.into(),
        };
        match outcome {
            RunOutcome::Cancelled => self.notify_cancelled(),
            RunOutcome::ConsumerGone => {
                self.session.cancel();
            }
            _ => {}
        }
        self.done.store(true, Ordering::Release);
        info!(target: "session", outcome = outcome.as_str(), "run_finished");
        self.session
    }

    /// Open the stream and feed fragments until it ends. The deadline covers
    /// both the request and the stream; whichever loses the race is dropped.
    async fn stream(&mut self, deadline: Instant) -> Result<(), RunFailure> {
        let original = self.session.original_arc();
        let expired = sleep_until(deadline);
        tokio::pin!(expired);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RunFailure::Stopped(Stop::Cancelled)),
            _ = &mut expired => return Err(RunFailure::TimedOut),
            opened = self.service.correct(&original) => opened,
        };
        let mut fragments = opened.map_err(RunFailure::Service)?;
        debug!(target: "session.stream", "stream_opened");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RunFailure::Stopped(Stop::Cancelled)),
                _ = &mut expired => return Err(RunFailure::TimedOut),
                next = fragments.next() => next,
            };
            match next {
                None => return Ok(()),
                Some(Err(err)) => return Err(RunFailure::Service(err)),
                Some(Ok(fragment)) => {
                    if let Some(segments) = self.session.push_fragment(&fragment) {
                        self.send(SessionEventKind::DiffUpdate(segments))
                            .await
                            .map_err(RunFailure::Stopped)?;
                    }
                }
            }
        }
    }

    async fn finalize(&mut self) -> RunOutcome {
        self.session.begin_finalize();
        let delay = self.session.settings().settle_delay;
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RunOutcome::Cancelled,
                _ = sleep(delay) => {}
            }
        }
        match self.session.settle() {
            Some(Ok(settlement)) => {
                let events = [
                    SessionEventKind::DiffUpdate(settlement.segments),
                    SessionEventKind::StatsUpdate(settlement.stats),
                ];
                for kind in events {
                    if let Err(stop) = self.send(kind).await {
                        return stop.into();
                    }
                }
                self.done.store(true, Ordering::Release);
                match self.send(SessionEventKind::Settled).await {
                    Ok(()) => RunOutcome::Completed,
                    Err(stop) => stop.into(),
                }
            }
            Some(Err(kind)) => {
                self.report(kind, "the correction service returned no text".to_string())
                    .await;
                RunOutcome::Failed
            }
            None => RunOutcome::Cancelled,
        }
    }

    async fn fail(&mut self, kind: ErrorKind, message: String) {
        self.session.fail(kind);
        self.report(kind, message).await;
    }

    async fn report(&mut self, kind: ErrorKind, message: String) {
        self.done.store(true, Ordering::Release);
        // A cancel racing the error wins; the owner is no longer listening for it.
        let _ = self.send(SessionEventKind::Error { kind, message }).await;
    }

    /// Deliver an event unless the run is cancelled first.
    async fn send(&self, kind: SessionEventKind) -> Result<(), Stop> {
        let event = SessionEvent::new(self.id, kind);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Stop::Cancelled),
            sent = emit(&self.events, event) => {
                if sent { Ok(()) } else { Err(Stop::ConsumerGone) }
            }
        }
    }

    /// The owner may be blocked waiting for this task, so the notice never waits for capacity.
    fn notify_cancelled(&mut self) {
        self.session.cancel();
        let event = SessionEvent::new(self.id, SessionEventKind::Cancelled);
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                bump(&CHANNEL_SEND_FAILURES);
                debug!(target: "session.events", session = self.id.0, "cancel_notice_dropped_full");
            }
            Err(TrySendError::Closed(_)) => {
                bump(&CHANNEL_SEND_FAILURES);
            }
        }
    }
}

enum RunFailure {
    Service(CorrectionError),
    TimedOut,
    Stopped(Stop),
}
