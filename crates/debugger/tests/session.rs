//! End-to-end session behavior against a scripted adapter.

use std::sync::Arc;
use std::time::Duration;

use debugger::testing::{offline_session, offline_session_with_removals, running_session, MockAdapter};
use debugger::{DebugSession, Error, EventBus, ScopeFilter, SessionRegistry, SessionState};
use serde_json::json;
use tokio::net::TcpListener;
use transport::{DapReader, DapWriter};

async fn wait_for_state(session: &Arc<DebugSession>, state: SessionState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if session.state() == state {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("session never reached {state}, still {}", session.state());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drive the session into `Paused` at /t/a.py:25 on thread 1.
async fn pause_session(session: &Arc<DebugSession>, adapter: &mut MockAdapter) {
    adapter
        .emit(
            "stopped",
            Some(json!({"reason": "breakpoint", "threadId": 1})),
        )
        .await;

    let stack = adapter.expect_command("stackTrace").await;
    assert_eq!(stack.arguments.as_ref().unwrap()["threadId"], 1);
    adapter
        .respond(
            &stack,
            json!({"stackFrames": [
                {"id": 10, "name": "f", "source": {"path": "/t/a.py"}, "line": 25, "column": 1}
            ]}),
        )
        .await;

    wait_for_state(session, SessionState::Paused).await;
}

#[tokio::test]
async fn handshake_reaches_running_with_primed_thread() {
    let (session, _adapter) = running_session(EventBus::new()).await.unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.current_thread_id(), Some(1));
    // No stop has happened, so there is no frame yet.
    assert_eq!(session.current_frame_id(), None);
    assert!(session.started_at() <= chrono::Utc::now());
}

#[tokio::test]
async fn handshake_failure_marks_the_session_failed() {
    let (session, mut adapter) = offline_session(EventBus::new());

    let script = tokio::spawn(async move {
        // Refuse initialize three times; the handshake gives up. The
        // adapter is handed back so the socket stays open meanwhile.
        for _ in 0..3 {
            let initialize = adapter.expect_command("initialize").await;
            adapter.respond_error(&initialize, "unsupported client").await;
        }
        adapter
    });

    let err = session.establish().await.unwrap_err();
    assert!(matches!(err, Error::Adapter { ref command, .. } if command == "initialize"));

    session.fail().await;
    assert_eq!(session.state(), SessionState::Error);
    drop(script.await.unwrap());
}

#[tokio::test]
async fn stopped_event_pauses_and_locals_come_back_tagged() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    pause_session(&session, &mut adapter).await;

    // Paused implies both context ids are set.
    assert_eq!(session.current_thread_id(), Some(1));
    assert_eq!(session.current_frame_id(), Some(10));

    let inspect = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.get_variables(ScopeFilter::Local).await }
    });

    let scopes = adapter.expect_command("scopes").await;
    assert_eq!(scopes.arguments.as_ref().unwrap()["frameId"], 10);
    adapter
        .respond(
            &scopes,
            json!({"scopes": [
                {"name": "Locals", "variablesReference": 100, "expensive": false},
                {"name": "Globals", "variablesReference": 200, "expensive": false}
            ]}),
        )
        .await;

    // Only the Locals scope is fetched under the local filter.
    let variables = adapter.expect_command("variables").await;
    assert_eq!(variables.arguments.as_ref().unwrap()["variablesReference"], 100);
    adapter
        .respond(
            &variables,
            json!({"variables": [
                {"name": "x", "value": "1", "type": "int", "variablesReference": 0}
            ]}),
        )
        .await;

    let variables = inspect.await.unwrap().unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].name, "x");
    assert_eq!(variables[0].value, "1");
    assert_eq!(variables[0].scope, "Locals");
}

#[tokio::test]
async fn call_stack_is_reported_from_the_paused_thread() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    pause_session(&session, &mut adapter).await;

    let inspect = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.get_call_stack().await }
    });

    let stack = adapter.expect_command("stackTrace").await;
    adapter
        .respond(
            &stack,
            json!({"stackFrames": [
                {"id": 10, "name": "f", "source": {"path": "/t/a.py"}, "line": 25, "column": 1},
                {"id": 11, "name": "<module>", "source": {"path": "/t/a.py"}, "line": 40, "column": 1}
            ]}),
        )
        .await;

    let frames = inspect.await.unwrap().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].name, "f");
    assert_eq!(frames[0].line, 25);
    assert_eq!(frames[1].name, "<module>");
}

#[tokio::test]
async fn evaluation_failures_are_data_not_errors() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    pause_session(&session, &mut adapter).await;

    let eval = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.evaluate("nope").await }
    });

    let request = adapter.expect_command("evaluate").await;
    let args = request.arguments.as_ref().unwrap();
    assert_eq!(args["expression"], "nope");
    assert_eq!(args["frameId"], 10);
    assert_eq!(args["context"], "repl");
    adapter
        .respond_error(&request, "NameError: name 'nope' is not defined")
        .await;

    let outcome = eval.await.unwrap().unwrap();
    assert!(outcome.error);
    assert!(outcome.result.contains("NameError"));
}

#[tokio::test]
async fn breakpoint_mutations_send_absolute_replacements() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    let file = std::path::Path::new("/t/a.py");

    // First breakpoint: the file's whole set is [10].
    let op = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.set_breakpoint(std::path::Path::new("/t/a.py"), 10).await }
    });
    let request = adapter.expect_command("setBreakpoints").await;
    let args = request.arguments.as_ref().unwrap();
    assert_eq!(args["source"]["path"], "/t/a.py");
    assert_eq!(args["breakpoints"], json!([{"line": 10}]));
    adapter
        .respond(&request, json!({"breakpoints": [{"id": 1, "verified": true, "line": 10}]}))
        .await;
    let first = op.await.unwrap().unwrap();
    assert!(first.verified);
    assert_eq!(first.id, 1);

    // Second: the set grows to [10, 20], in that order.
    let op = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.set_breakpoint(std::path::Path::new("/t/a.py"), 20).await }
    });
    let request = adapter.expect_command("setBreakpoints").await;
    assert_eq!(
        request.arguments.as_ref().unwrap()["breakpoints"],
        json!([{"line": 10}, {"line": 20}])
    );
    adapter
        .respond(
            &request,
            json!({"breakpoints": [
                {"id": 1, "verified": true, "line": 10},
                {"id": 2, "verified": true, "line": 20}
            ]}),
        )
        .await;
    op.await.unwrap().unwrap();

    // Removal sends the remainder, [20].
    let op = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.remove_breakpoint(std::path::Path::new("/t/a.py"), 10).await }
    });
    let request = adapter.expect_command("setBreakpoints").await;
    assert_eq!(
        request.arguments.as_ref().unwrap()["breakpoints"],
        json!([{"line": 20}])
    );
    adapter
        .respond(&request, json!({"breakpoints": [{"id": 2, "verified": true, "line": 20}]}))
        .await;
    op.await.unwrap().unwrap();

    let listed = session.list_breakpoints(Some(file)).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].line, 20);
}

#[tokio::test]
async fn setting_the_same_breakpoint_twice_is_idempotent() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    let file = std::path::Path::new("/t/a.py");

    for _ in 0..2 {
        let op = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.set_breakpoint(std::path::Path::new("/t/a.py"), 10).await }
        });
        let request = adapter.expect_command("setBreakpoints").await;
        // The set never gains a duplicate.
        assert_eq!(
            request.arguments.as_ref().unwrap()["breakpoints"],
            json!([{"line": 10}])
        );
        adapter
            .respond(&request, json!({"breakpoints": [{"id": 1, "verified": true, "line": 10}]}))
            .await;
        op.await.unwrap().unwrap();
    }

    let listed = session.list_breakpoints(Some(file)).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].line, 10);
}

#[tokio::test]
async fn unverified_breakpoints_are_retained() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    let file = std::path::Path::new("/t/a.py");

    let op = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.set_breakpoint(std::path::Path::new("/t/a.py"), 999).await }
    });
    let request = adapter.expect_command("setBreakpoints").await;
    adapter
        .respond(
            &request,
            json!({"breakpoints": [{"verified": false, "message": "line is unreachable"}]}),
        )
        .await;

    let breakpoint = op.await.unwrap().unwrap();
    assert!(!breakpoint.verified);
    // Still cached so a later reconciliation can verify it.
    assert_eq!(session.list_breakpoints(Some(file)).await.len(), 1);
}

#[tokio::test]
async fn stepping_requires_a_paused_thread() {
    let (session, _adapter) = running_session(EventBus::new()).await.unwrap();

    // Running, not paused: every step operation refuses.
    assert!(matches!(
        session.continue_().await.unwrap_err(),
        Error::NoActiveThread
    ));
    assert!(matches!(
        session.step_over().await.unwrap_err(),
        Error::NoActiveThread
    ));
    assert!(matches!(
        session.get_variables(ScopeFilter::All).await.unwrap_err(),
        Error::NoActiveFrame
    ));
}

#[tokio::test]
async fn continued_event_resumes_and_clears_the_frame() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    pause_session(&session, &mut adapter).await;

    let op = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.continue_().await }
    });
    let request = adapter.expect_command("continue").await;
    assert_eq!(request.arguments.as_ref().unwrap()["threadId"], 1);
    adapter
        .respond(&request, json!({"allThreadsContinued": true}))
        .await;
    op.await.unwrap().unwrap();

    // The state flips on the continued event, not on the response.
    adapter
        .emit("continued", Some(json!({"threadId": 1})))
        .await;
    wait_for_state(&session, SessionState::Running).await;
    assert_eq!(session.current_frame_id(), None);
}

#[tokio::test]
async fn exited_event_is_terminal() {
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let (session, mut adapter) = running_session(bus).await.unwrap();

    adapter.emit("exited", Some(json!({"exitCode": 0}))).await;
    wait_for_state(&session, SessionState::Stopped).await;

    // A straggling stopped event must not resurrect the session.
    adapter
        .emit("stopped", Some(json!({"reason": "breakpoint", "threadId": 1})))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), SessionState::Stopped);

    assert!(matches!(
        session
            .set_breakpoint(std::path::Path::new("/t/a.py"), 5)
            .await
            .unwrap_err(),
        Error::SessionEnded
    ));

    // The exit was classified as normal on the bus.
    loop {
        match events.recv().await.unwrap() {
            debugger::DebugEvent::Exited {
                exit_code, normal, ..
            } => {
                assert_eq!(exit_code, 0);
                assert!(normal);
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn terminal_sessions_notify_the_removal_channel() {
    let (removal_tx, mut removal_rx) = tokio::sync::mpsc::unbounded_channel();
    let (session, mut adapter) =
        offline_session_with_removals(EventBus::new(), Some(removal_tx));

    let script = tokio::spawn(async move {
        adapter.complete_handshake().await;
        adapter.emit("terminated", None).await;
        adapter
    });
    session.establish().await.unwrap();
    let _adapter = script.await.unwrap();

    let id = removal_rx.recv().await.unwrap();
    assert_eq!(id, "test-session");
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn terminate_rejects_a_pending_request_with_disconnection() {
    let (session, mut adapter) = running_session(EventBus::new()).await.unwrap();
    pause_session(&session, &mut adapter).await;

    let inspect = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.get_variables(ScopeFilter::All).await }
    });

    // The request reaches the adapter, which never answers.
    let _scopes = adapter.expect_command("scopes").await;

    session.terminate().await;

    assert!(matches!(
        inspect.await.unwrap().unwrap_err(),
        Error::Disconnected
    ));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.evaluate("x").await.unwrap_err(),
        Error::SessionEnded
    ));
}

#[tokio::test]
async fn attach_over_tcp_stop_session_evicts_from_the_registry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let adapter_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, write) = stream.into_split();
        let mut adapter = MockAdapter::over(DapReader::new(read), DapWriter::new(write));
        adapter.complete_handshake().await;
        // Drain whatever arrives until the bridge hangs up.
        while adapter.try_recv_request().await.is_some() {}
    });

    let script = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
    let registry = SessionRegistry::new(EventBus::new());
    let summary = registry
        .attach_session(script.path().to_path_buf(), Some(port))
        .await
        .unwrap();

    assert_eq!(summary.state, SessionState::Running);
    assert_eq!(summary.port, port);

    let (summaries, stats) = registry.list().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(stats.running, 1);

    registry.stop_session(&summary.id).await.unwrap();
    assert!(matches!(
        registry.get(&summary.id).await.unwrap_err(),
        Error::SessionNotFound(_)
    ));
    let (summaries, _) = registry.list().await;
    assert!(summaries.is_empty());

    adapter_task.await.unwrap();
}

#[tokio::test]
async fn shutdown_all_empties_the_registry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let adapter_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, write) = stream.into_split();
        let mut adapter = MockAdapter::over(DapReader::new(read), DapWriter::new(write));
        adapter.complete_handshake().await;
        while adapter.try_recv_request().await.is_some() {}
    });

    let script = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
    let registry = SessionRegistry::new(EventBus::new());
    registry
        .attach_session(script.path().to_path_buf(), Some(port))
        .await
        .unwrap();

    registry.shutdown_all().await;

    let (summaries, stats) = registry.list().await;
    assert!(summaries.is_empty());
    assert_eq!(stats.total, 0);
    adapter_task.await.unwrap();
}
