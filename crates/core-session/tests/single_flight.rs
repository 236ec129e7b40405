mod common;

use common::{collect_run, controller, names, settings};
use core_events::{SESSIONS_REJECTED, SessionEvent, SessionEventKind};
use core_service::ScriptedService;
use core_session::{SessionController, StartError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

#[tokio::test]
async fn second_start_is_rejected_while_streaming() {
    let service = ScriptedService::from_fragments(["a"]).then_hang();
    let (mut ctl, mut rx, service) = controller(service, settings(1));

    let first = ctl.start("abc").unwrap();
    let event = rx.recv().await.unwrap();
    assert!(matches!(event.kind, SessionEventKind::DiffUpdate(_)));
    assert!(ctl.is_rewriting());

    let rejected_before = SESSIONS_REJECTED.load(Ordering::Relaxed);
    assert_eq!(ctl.start("xyz"), Err(StartError::AlreadyRewriting));
    assert!(SESSIONS_REJECTED.load(Ordering::Relaxed) > rejected_before);
    assert_eq!(ctl.current(), Some(first));
    assert_eq!(service.received(), vec!["abc".to_string()]);

    ctl.cancel().await.unwrap();
    let notice = rx.recv().await.unwrap();
    assert_eq!((notice.session, notice.kind), (first, SessionEventKind::Cancelled));

    let second = ctl.start("xyz").unwrap();
    assert_ne!(first, second);
    let event = rx.recv().await.unwrap();
    assert_eq!(event.session, second);
    assert_eq!(service.received(), vec!["abc".to_string(), "xyz".to_string()]);
    ctl.cancel().await;
}

#[tokio::test]
async fn rejected_start_leaves_running_session_untouched() {
    let service = ScriptedService::from_fragments(["ab", "c"]);
    let (mut ctl, mut rx, _service) = controller(service, settings(100));

    let id = ctl.start("abc").unwrap();
    assert_eq!(ctl.start("zzz"), Err(StartError::AlreadyRewriting));
    let events = collect_run(&mut rx).await;
    assert_eq!(names(&events), vec!["diff_update", "stats_update", "settled"]);
    assert!(events.iter().all(|e| e.session == id));
    let session = ctl.join().await.unwrap();
    assert_eq!(session.original(), "abc");
    assert_eq!(session.corrected_text(), Some("abc"));
}

#[tokio::test]
async fn empty_original_is_rejected_without_a_request() {
    let service = ScriptedService::from_fragments(["x"]);
    let (mut ctl, _rx, service) = controller(service, settings(1));

    assert_eq!(ctl.start(""), Err(StartError::EmptyOriginal));
    assert_eq!(ctl.start(" \n\t"), Err(StartError::EmptyOriginal));
    assert!(!ctl.is_rewriting());
    assert_eq!(ctl.current(), None);
    assert!(service.received().is_empty());
}

#[tokio::test]
async fn next_start_keeps_previous_terminal_event_on_full_channel() {
    let service = Arc::new(ScriptedService::from_fragments(["abc"]));
    let (tx, mut rx) = mpsc::channel::<SessionEvent>(1);
    let mut ctl = SessionController::new(Arc::clone(&service), settings(100), tx);

    let first = ctl.start("abd").unwrap();
    let event = rx.recv().await.unwrap();
    assert!(matches!(event.kind, SessionEventKind::DiffUpdate(_)));

    // StatsUpdate fills the one slot; Settled is left waiting for capacity.
    let mut spins = 0;
    while ctl.is_rewriting() {
        assert!(spins < 1_000, "first run never reached its terminal event");
        spins += 1;
        tokio::task::yield_now().await;
    }
    let second = ctl.start("xyz").unwrap();

    let mut events = Vec::new();
    while events
        .iter()
        .filter(|e: &&SessionEvent| e.kind == SessionEventKind::Settled)
        .count()
        < 2
    {
        events.push(rx.recv().await.unwrap());
    }
    let (first_events, second_events): (Vec<_>, Vec<_>) =
        events.into_iter().partition(|e| e.session == first);
    assert_eq!(names(&first_events), vec!["stats_update", "settled"]);
    assert!(second_events.iter().all(|e| e.session == second));
    assert_eq!(
        names(&second_events),
        vec!["diff_update", "stats_update", "settled"]
    );
    ctl.join().await.unwrap();
}
