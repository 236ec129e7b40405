mod common;

use common::{collect_run, controller, names, settings};
use core_events::{ErrorKind, SessionEvent, SessionEventKind};
use core_service::{CorrectionError, ScriptedService};
use core_session::SessionPhase;
use pretty_assertions::assert_eq;

fn error_of(event: &SessionEvent) -> (ErrorKind, &str) {
    match &event.kind {
        SessionEventKind::Error { kind, message } => (*kind, message.as_str()),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_at_start() {
    let service = ScriptedService::failing_at_start(CorrectionError::RateLimited);
    let (mut ctl, mut rx, _service) = controller(service, settings(1));

    ctl.start("公圓").unwrap();
    let events = collect_run(&mut rx).await;
    assert_eq!(events.len(), 1);
    let (kind, message) = error_of(&events[0]);
    assert_eq!(kind, ErrorKind::RateLimit);
    assert!(kind.is_retryable_later());
    assert!(message.contains("rate limited"));
}

#[tokio::test]
async fn rejected_credential_is_auth() {
    let service = ScriptedService::failing_at_start(CorrectionError::Auth { status: 401 });
    let (mut ctl, mut rx, _service) = controller(service, settings(1));

    ctl.start("公圓").unwrap();
    let events = collect_run(&mut rx).await;
    assert_eq!(error_of(&events[0]).0, ErrorKind::Auth);
    let session = ctl.join().await.unwrap();
    assert_eq!(session.last_terminal(), Some(SessionPhase::Failed));
}

#[tokio::test]
async fn mid_stream_failure_shows_no_final_diff() {
    let service = ScriptedService::from_fragments(["今天"]).then_fail(CorrectionError::Network {
        status: None,
        message: "connection reset".into(),
    });
    let (mut ctl, mut rx, _service) = controller(service, settings(1));

    ctl.start("今天天氣").unwrap();
    let events = collect_run(&mut rx).await;
    assert_eq!(names(&events), vec!["diff_update", "error"]);
    let (kind, message) = error_of(&events[1]);
    assert_eq!(kind, ErrorKind::Network);
    assert!(message.contains("connection reset"));
    assert!(!events.iter().any(|e| e.kind == SessionEventKind::Settled));
}

#[tokio::test]
async fn empty_stream_is_an_error() {
    let service = ScriptedService::from_fragments(Vec::<String>::new());
    let (mut ctl, mut rx, _service) = controller(service, settings(1));

    ctl.start("公圓").unwrap();
    let events = collect_run(&mut rx).await;
    assert_eq!(names(&events), vec!["error"]);
    assert_eq!(error_of(&events[0]).0, ErrorKind::EmptyResponse);
}

#[tokio::test]
async fn whitespace_only_rewrite_is_an_error() {
    let service = ScriptedService::from_fragments([" ", "\n"]);
    let (mut ctl, mut rx, _service) = controller(service, settings(100));

    ctl.start("公圓").unwrap();
    let events = collect_run(&mut rx).await;
    assert_eq!(error_of(&events[0]).0, ErrorKind::EmptyResponse);
}

#[tokio::test]
async fn failed_run_allows_a_new_one() {
    let service = ScriptedService::failing_at_start(CorrectionError::RateLimited);
    let (mut ctl, mut rx, _service) = controller(service, settings(1));

    ctl.start("一").unwrap();
    collect_run(&mut rx).await;
    assert!(!ctl.is_rewriting());
    assert!(ctl.start("二").is_ok());
    collect_run(&mut rx).await;
}
