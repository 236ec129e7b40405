use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use crate::{CorrectionError, CorrectionService, FragmentStream};

/// One scripted stream item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Fragment(String),
    /// Terminal stream error.
    Fail(CorrectionError),
    /// Stop producing without ending the stream (until the consumer drops it).
    Hang,
}

/// Deterministic correction service: replays a fixed script for every request.
///
/// Fragments are produced by a small tokio task so that per-fragment delays interact with
/// `tokio::time` (including paused test clocks) exactly like a network stream would.
#[derive(Debug, Default)]
pub struct ScriptedService {
    steps: Vec<ScriptStep>,
    start_error: Option<CorrectionError>,
    delay: Duration,
    received: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn from_fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            steps: fragments
                .into_iter()
                .map(|f| ScriptStep::Fragment(f.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Rejects every request before streaming starts.
    pub fn failing_at_start(err: CorrectionError) -> Self {
        Self {
            start_error: Some(err),
            ..Self::default()
        }
    }

    /// Sleep before each step.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then_fail(mut self, err: CorrectionError) -> Self {
        self.steps.push(ScriptStep::Fail(err));
        self
    }

    pub fn then_hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }

    /// Original texts received so far, in request order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl CorrectionService for ScriptedService {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn correct(
        &self,
        original: &str,
    ) -> impl Future<Output = Result<FragmentStream, CorrectionError>> + Send {
        if let Ok(mut received) = self.received.lock() {
            received.push(original.to_string());
        }
        let start_error = self.start_error.clone();
        let steps = self.steps.clone();
        let delay = self.delay;
        async move {
            if let Some(err) = start_error {
                return Err(err);
            }
            let (tx, rx) = mpsc::channel(steps.len().max(1));
            tokio::spawn(async move {
                for step in steps {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match step {
                        ScriptStep::Fragment(fragment) => {
                            if tx.send(Ok(fragment)).await.is_err() {
                                trace!(target: "service.scripted", "consumer_dropped");
                                return;
                            }
                        }
                        ScriptStep::Fail(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                        ScriptStep::Hang => {
                            tx.closed().await;
                            return;
                        }
                    }
                }
            });
            let stream: FragmentStream = Box::pin(ReceiverStream::new(rx));
            Ok(stream)
        }
    }
}
