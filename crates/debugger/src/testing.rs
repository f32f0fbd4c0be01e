//! A scripted adapter for exercising sessions without debugpy.
//!
//! [`MockAdapter`] plays the server side of a DAP connection: tests read
//! the requests the engine sends and script responses and events back,
//! over an in-memory pipe or a real socket.

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::mpsc;
use transport::{
    DapReader, DapWriter, Message, OutgoingEvent, OutgoingMessage, OutgoingResponse, Request, Seq,
};

use crate::bus::EventBus;
use crate::session::{DebugSession, SessionConfig};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

pub struct MockAdapter<R = DuplexStream, W = DuplexStream> {
    reader: DapReader<R>,
    writer: DapWriter<W>,
    seq: Seq,
}

impl<R, W> MockAdapter<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn over(reader: DapReader<R>, writer: DapWriter<W>) -> Self {
        Self {
            reader,
            writer,
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> Seq {
        self.seq += 1;
        self.seq
    }

    /// Next request from the client. Panics on end of stream: a scripted
    /// exchange that ends early is a test failure.
    pub async fn recv_request(&mut self) -> Request {
        use futures::StreamExt;
        match self.reader.next().await {
            Some(Ok(Message::Request(request))) => request,
            Some(Ok(other)) => panic!("mock adapter expected a request, got {other:?}"),
            Some(Err(e)) => panic!("mock adapter decode error: {e}"),
            None => panic!("client closed the connection mid-script"),
        }
    }

    /// Like [`MockAdapter::recv_request`] but yields `None` at end of
    /// stream, for scripts that expect the client to disconnect.
    pub async fn try_recv_request(&mut self) -> Option<Request> {
        use futures::StreamExt;
        match self.reader.next().await {
            Some(Ok(Message::Request(request))) => Some(request),
            _ => None,
        }
    }

    /// Wait for a request with the given command, answering nothing in
    /// between. Panics if a different command arrives first.
    pub async fn expect_command(&mut self, command: &str) -> Request {
        let request = self.recv_request().await;
        assert_eq!(
            request.command, command,
            "mock adapter expected {command}, got {}",
            request.command
        );
        request
    }

    pub async fn respond(&mut self, request: &Request, body: Value) {
        let seq = self.next_seq();
        self.writer
            .send(OutgoingMessage::Response(OutgoingResponse {
                seq,
                request_seq: request.seq,
                success: true,
                command: request.command.clone(),
                message: None,
                body: Some(body),
            }))
            .await
            .expect("mock adapter write");
    }

    pub async fn respond_empty(&mut self, request: &Request) {
        self.respond(request, json!({})).await;
    }

    pub async fn respond_error(&mut self, request: &Request, message: &str) {
        let seq = self.next_seq();
        self.writer
            .send(OutgoingMessage::Response(OutgoingResponse {
                seq,
                request_seq: request.seq,
                success: false,
                command: request.command.clone(),
                message: Some(message.to_string()),
                body: None,
            }))
            .await
            .expect("mock adapter write");
    }

    pub async fn emit(&mut self, event: &str, body: Option<Value>) {
        let seq = self.next_seq();
        self.writer
            .send(OutgoingMessage::Event(OutgoingEvent {
                seq,
                event: event.to_string(),
                body,
            }))
            .await
            .expect("mock adapter write");
    }

    /// Script the full happy-path handshake: answer `initialize`, emit
    /// `initialized` on `attach`, answer the `threads` probe and
    /// `configurationDone`, then the priming `threads`/`stackTrace` pair
    /// (the latter with an error, as a not-yet-stopped debuggee answers).
    pub async fn complete_handshake(&mut self) {
        let initialize = self.expect_command("initialize").await;
        self.respond(
            &initialize,
            json!({"supportsConfigurationDoneRequest": true}),
        )
        .await;

        let attach = self.expect_command("attach").await;
        self.emit("initialized", None).await;
        self.respond_empty(&attach).await;

        let probe = self.expect_command("threads").await;
        self.respond(&probe, json!({"threads": [{"id": 1, "name": "MainThread"}]}))
            .await;

        let config_done = self.expect_command("configurationDone").await;
        self.respond_empty(&config_done).await;

        let prime_threads = self.expect_command("threads").await;
        self.respond(
            &prime_threads,
            json!({"threads": [{"id": 1, "name": "MainThread"}]}),
        )
        .await;

        let prime_stack = self.expect_command("stackTrace").await;
        self.respond_error(&prime_stack, "thread is not suspended").await;
    }
}

/// A session wired to a [`MockAdapter`] over an in-memory pipe, still in
/// `Starting`. The test decides whether and how the handshake plays out.
pub fn offline_session(bus: EventBus) -> (Arc<DebugSession>, MockAdapter) {
    offline_session_with_removals(bus, None)
}

/// Same, with the registry-style removal channel attached so tests can
/// observe terminal notifications.
pub fn offline_session_with_removals(
    bus: EventBus,
    removal_tx: Option<mpsc::UnboundedSender<String>>,
) -> (Arc<DebugSession>, MockAdapter) {
    let ((client_reader, client_writer), (adapter_reader, adapter_writer)) =
        transport::testing::pipe();

    let session = DebugSession::new(
        SessionConfig {
            id: "test-session".to_string(),
            script: PathBuf::from("/t/a.py"),
            port: 5679,
            cwd: PathBuf::from("/t"),
        },
        client_reader,
        client_writer,
        None,
        bus,
        removal_tx,
    );

    (session, MockAdapter::over(adapter_reader, adapter_writer))
}

/// A session that has been through the scripted handshake and sits in
/// `Running` with thread 1 primed.
pub async fn running_session(bus: EventBus) -> Result<(Arc<DebugSession>, MockAdapter)> {
    let (session, mut adapter) = offline_session(bus);

    let script = tokio::spawn(async move {
        adapter.complete_handshake().await;
        adapter
    });

    session.establish().await?;
    let adapter = script.await.expect("handshake script");
    Ok((session, adapter))
}
