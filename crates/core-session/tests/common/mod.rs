#![allow(dead_code)] // Each test binary uses a subset of helpers.

use std::sync::Arc;
use std::time::Duration;

use core_config::SessionSettings;
use core_events::{SessionEvent, SessionEventKind, session_channel};
use core_service::ScriptedService;
use core_session::SessionController;
use tokio::sync::mpsc::Receiver;

pub fn settings(threshold: usize) -> SessionSettings {
    SessionSettings {
        compare_threshold: threshold,
        timeout: Duration::from_secs(30),
        settle_delay: Duration::ZERO,
        trim_settled: true,
    }
}

pub fn controller(
    service: ScriptedService,
    settings: SessionSettings,
) -> (
    SessionController<ScriptedService>,
    Receiver<SessionEvent>,
    Arc<ScriptedService>,
) {
    let service = Arc::new(service);
    let (tx, rx) = session_channel();
    (
        SessionController::new(Arc::clone(&service), settings, tx),
        rx,
        service,
    )
}

/// Receive events up to and including the first terminal one.
pub async fn collect_run(rx: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.kind.is_terminal();
        out.push(event);
        if terminal {
            break;
        }
    }
    out
}

/// Everything already queued, without waiting.
pub fn drain(rx: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn names(events: &[SessionEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.name()).collect()
}

pub fn diff_updates(events: &[SessionEvent]) -> Vec<&[core_diff::StyledSegment]> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            SessionEventKind::DiffUpdate(segments) => Some(segments.as_slice()),
            _ => None,
        })
        .collect()
}
