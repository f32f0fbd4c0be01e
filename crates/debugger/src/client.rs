//! DAP client: one socket, one reader task, one writer task.
//!
//! The client multiplexes concurrent typed requests over a single framed
//! connection. Outgoing requests get a strictly increasing sequence number
//! (starting at 1) and a pending-map entry; the reader task resolves
//! entries as responses arrive, in whatever order the adapter chooses.
//! Events are normalized into [`AdapterEvent`]s and pushed onto the
//! channel handed out at construction; the session's event loop consumes
//! them serially. Reverse requests from the adapter are not part of this
//! system and are dropped with a warning.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use transport::{DapReader, DapWriter, Message, OutgoingMessage, Request, Response, Seq};

use crate::error::Error;
use crate::protocol::requests::{
    Attach, ConnectInfo, Continue, Disconnect, Evaluate, Initialize, Next, PathMapping, Pause,
    RequestBody, Scopes, SetBreakpoints, StackTrace, StepIn, StepOut, Variables,
};
use crate::protocol::responses::{
    EvaluateResponse, ScopesResponse, SetBreakpointsResponse, StackTraceResponse, ThreadsResponse,
    VariablesResponse,
};
use crate::protocol::types::{
    AdapterBreakpoint, Scope, Source, SourceBreakpoint, StackFrame, StackFrameId, Thread, ThreadId,
    Variable, VariablesReference,
};
use crate::protocol::AdapterEvent;
use crate::Result;

/// How long a single request may wait for its response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct DapClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    write_tx: mpsc::UnboundedSender<OutgoingMessage>,
    seq: AtomicI64,
    pending: Mutex<HashMap<Seq, oneshot::Sender<Response>>>,
    initialized: InitializedGate,
    alive: AtomicBool,
    cancel: CancellationToken,
    request_timeout: Duration,
}

/// One-shot rendezvous for the adapter's `initialized` event. The event
/// fires at most once per session; a subscriber that arrives late still
/// resolves immediately.
#[derive(Debug)]
struct InitializedGate {
    seen: AtomicBool,
    waiter: Mutex<Option<oneshot::Sender<()>>>,
}

impl InitializedGate {
    fn new() -> Self {
        Self {
            seen: AtomicBool::new(false),
            waiter: Mutex::new(None),
        }
    }

    fn open(&self) {
        self.seen.store(true, Ordering::SeqCst);
        if let Some(tx) = self.waiter.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    fn subscribe(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.seen.load(Ordering::SeqCst) {
            let _ = tx.send(());
        } else {
            *self.waiter.lock().unwrap() = Some(tx);
        }
        rx
    }
}

impl DapClient {
    /// Wrap a framed connection. Returns the client handle and the stream
    /// of normalized adapter events; the channel closes when the socket
    /// does, which is the session's cue to wind down.
    pub fn new<R, W>(
        reader: DapReader<R>,
        writer: DapWriter<W>,
    ) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_request_timeout(reader, writer, REQUEST_TIMEOUT)
    }

    /// Like [`DapClient::new`] with a custom per-request timeout. Tests
    /// use short timeouts; production code keeps the default.
    pub fn with_request_timeout<R, W>(
        reader: DapReader<R>,
        writer: DapWriter<W>,
        request_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let inner = Arc::new(ClientInner {
            write_tx,
            seq: AtomicI64::new(0),
            pending: Mutex::new(HashMap::new()),
            initialized: InitializedGate::new(),
            alive: AtomicBool::new(true),
            cancel: cancel.clone(),
            request_timeout,
        });

        tokio::spawn(run_writer(writer, write_rx, cancel.clone()));
        tokio::spawn(run_reader(reader, Arc::clone(&inner), event_tx, cancel));

        (Self { inner }, event_rx)
    }

    /// Send a request and await its response body.
    ///
    /// Exactly one of three things happens to every issued request: its
    /// response resolves it, the per-request timeout rejects it, or a
    /// disconnect rejects it.
    pub async fn request(&self, body: RequestBody) -> Result<Option<serde_json::Value>> {
        let command = body.command();
        let seq = self.next_seq();
        let rx = self.register_and_send(seq, body)?;

        let response = match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Err(_elapsed) => {
                // Expired entries leave the pending map immediately; a
                // straggling response will find nothing to resolve.
                self.inner.pending.lock().unwrap().remove(&seq);
                return Err(Error::RequestTimeout {
                    command: command.to_string(),
                    secs: self.inner.request_timeout.as_secs(),
                });
            }
            Ok(Err(_dropped)) => return Err(Error::Disconnected),
            Ok(Ok(response)) => response,
        };

        if response.success {
            Ok(response.body)
        } else {
            Err(Error::Adapter {
                command: command.to_string(),
                message: response
                    .message
                    .unwrap_or_else(|| "no error message".to_string()),
            })
        }
    }

    /// Send a request without awaiting it here. The eventual outcome is
    /// logged from a detached task. Used for `attach`, whose response some
    /// debugpy versions never send, and for the best-effort `disconnect`.
    pub fn fire(&self, body: RequestBody) -> Result<Seq> {
        let command = body.command();
        let seq = self.next_seq();
        let rx = self.register_and_send(seq, body)?;

        tokio::spawn(async move {
            match rx.await {
                Ok(response) if response.success => {
                    tracing::debug!(command, seq, "fire-and-forget request acknowledged");
                }
                Ok(response) => {
                    tracing::warn!(
                        command,
                        seq,
                        message = response.message.as_deref().unwrap_or(""),
                        "fire-and-forget request rejected"
                    );
                }
                Err(_) => {
                    tracing::debug!(command, seq, "fire-and-forget request dropped");
                }
            }
        });

        Ok(seq)
    }

    /// Future resolving when the adapter has sent its `initialized` event.
    /// Resolves immediately if the event already arrived.
    pub fn initialized(&self) -> oneshot::Receiver<()> {
        self.inner.initialized.subscribe()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// Tear the connection down: cancel both I/O tasks (closing the
    /// socket) and reject every outstanding request with a disconnection
    /// error.
    pub fn shutdown(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.cancel.cancel();
        self.inner.fail_pending();
    }

    fn next_seq(&self) -> Seq {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn register_and_send(&self, seq: Seq, body: RequestBody) -> Result<oneshot::Receiver<Response>> {
        if !self.is_alive() {
            return Err(Error::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(seq, tx);

        let request = Request {
            seq,
            command: body.command().to_string(),
            arguments: body.arguments(),
        };

        if self
            .inner
            .write_tx
            .send(OutgoingMessage::Request(request))
            .is_err()
        {
            self.inner.pending.lock().unwrap().remove(&seq);
            return Err(Error::Disconnected);
        }

        Ok(rx)
    }

    fn parse<T: for<'de> serde::Deserialize<'de>>(
        command: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        serde_json::from_value(body.unwrap_or(serde_json::Value::Null)).map_err(|source| {
            Error::MalformedResponse {
                command: command.to_string(),
                source,
            }
        })
    }

    // Typed operations.

    pub async fn initialize(&self) -> Result<()> {
        self.request(RequestBody::Initialize(Initialize {
            client_id: "debug-bridge".to_string(),
            client_name: "debug-bridge".to_string(),
            adapter_id: "debugpy".to_string(),
            path_format: "path".to_string(),
            lines_start_at_one: true,
            columns_start_at_one: true,
            supports_variable_type: true,
            supports_variable_paging: true,
        }))
        .await?;
        Ok(())
    }

    /// Fire the attach request. The response is intentionally not awaited;
    /// the caller rendezvouses on the `initialized` event instead.
    pub fn attach(&self, port: u16, cwd: &Path) -> Result<Seq> {
        self.fire(RequestBody::Attach(Attach {
            connect: ConnectInfo {
                host: "localhost".to_string(),
                port,
            },
            path_mappings: vec![PathMapping {
                local_root: cwd.to_path_buf(),
                remote_root: cwd.to_path_buf(),
            }],
            just_my_code: false,
        }))
    }

    /// Replace the full breakpoint set for one source file. The response
    /// array corresponds positionally to `lines`.
    pub async fn set_breakpoints(
        &self,
        path: &Path,
        lines: &[i64],
    ) -> Result<Vec<AdapterBreakpoint>> {
        let body = self
            .request(RequestBody::SetBreakpoints(SetBreakpoints {
                source: Source {
                    name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned()),
                    path: Some(path.to_path_buf()),
                },
                breakpoints: lines.iter().map(|&line| SourceBreakpoint { line }).collect(),
                source_modified: false,
            }))
            .await?;

        let parsed: SetBreakpointsResponse = Self::parse("setBreakpoints", body)?;
        Ok(parsed.breakpoints)
    }

    pub async fn threads(&self) -> Result<Vec<Thread>> {
        let body = self.request(RequestBody::Threads).await?;
        let parsed: ThreadsResponse = Self::parse("threads", body)?;
        Ok(parsed.threads)
    }

    pub async fn stack_trace(&self, thread_id: ThreadId) -> Result<Vec<StackFrame>> {
        let body = self
            .request(RequestBody::StackTrace(StackTrace { thread_id }))
            .await?;
        let parsed: StackTraceResponse = Self::parse("stackTrace", body)?;
        Ok(parsed.stack_frames)
    }

    pub async fn scopes(&self, frame_id: StackFrameId) -> Result<Vec<Scope>> {
        let body = self.request(RequestBody::Scopes(Scopes { frame_id })).await?;
        let parsed: ScopesResponse = Self::parse("scopes", body)?;
        Ok(parsed.scopes)
    }

    pub async fn variables(&self, reference: VariablesReference) -> Result<Vec<Variable>> {
        let body = self
            .request(RequestBody::Variables(Variables {
                variables_reference: reference,
            }))
            .await?;
        let parsed: VariablesResponse = Self::parse("variables", body)?;
        Ok(parsed.variables)
    }

    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: StackFrameId,
    ) -> Result<EvaluateResponse> {
        let body = self
            .request(RequestBody::Evaluate(Evaluate {
                expression: expression.to_string(),
                frame_id: Some(frame_id),
                context: "repl".to_string(),
            }))
            .await?;
        Self::parse("evaluate", body)
    }

    pub async fn continue_(&self, thread_id: ThreadId) -> Result<()> {
        self.request(RequestBody::Continue(Continue { thread_id }))
            .await?;
        Ok(())
    }

    pub async fn next(&self, thread_id: ThreadId) -> Result<()> {
        self.request(RequestBody::Next(Next { thread_id })).await?;
        Ok(())
    }

    pub async fn step_in(&self, thread_id: ThreadId) -> Result<()> {
        self.request(RequestBody::StepIn(StepIn { thread_id }))
            .await?;
        Ok(())
    }

    pub async fn step_out(&self, thread_id: ThreadId) -> Result<()> {
        self.request(RequestBody::StepOut(StepOut { thread_id }))
            .await?;
        Ok(())
    }

    pub async fn pause(&self, thread_id: ThreadId) -> Result<()> {
        self.request(RequestBody::Pause(Pause { thread_id }))
            .await?;
        Ok(())
    }

    pub async fn configuration_done(&self) -> Result<()> {
        self.request(RequestBody::ConfigurationDone).await?;
        Ok(())
    }

    /// Best-effort disconnect, fired on the way down.
    pub fn disconnect(&self) {
        let _ = self.fire(RequestBody::Disconnect(Disconnect {
            terminate_debuggee: true,
        }));
    }
}

impl ClientInner {
    fn resolve(&self, response: Response) {
        let waiter = self.pending.lock().unwrap().remove(&response.request_seq);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                tracing::warn!(
                    request_seq = response.request_seq,
                    command = %response.command,
                    "response without a pending request"
                );
            }
        }
    }

    /// Drop every pending waiter; their receivers observe the closed
    /// channel and surface a disconnection error.
    fn fail_pending(&self) {
        let dropped = {
            let mut pending = self.pending.lock().unwrap();
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!(count = dropped, "rejected outstanding requests on disconnect");
        }
    }
}

async fn run_writer<W>(
    mut writer: DapWriter<W>,
    mut write_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = writer.send(msg).await {
                    tracing::error!(error = %e, "failed to write to adapter");
                    break;
                }
            }
        }
    }
    tracing::debug!("writer task finished");
}

async fn run_reader<R>(
    mut reader: DapReader<R>,
    inner: Arc<ClientInner>,
    event_tx: mpsc::UnboundedSender<AdapterEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = reader.next() => msg,
        };

        match msg {
            Some(Ok(Message::Response(response))) => inner.resolve(response),
            Some(Ok(Message::Event(event))) => {
                let event = AdapterEvent::from_wire(event);
                if matches!(event, AdapterEvent::Initialized) {
                    inner.initialized.open();
                }
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Request(request))) => {
                tracing::warn!(command = %request.command, "dropping reverse request from adapter");
            }
            Some(Err(e)) => {
                // The codec already resynchronized; keep reading.
                tracing::warn!(error = %e, "malformed frame from adapter");
            }
            None => {
                tracing::debug!("adapter closed the connection");
                break;
            }
        }
    }

    inner.alive.store(false, Ordering::SeqCst);
    inner.fail_pending();
    // event_tx drops here; the session loop observes the closed channel.
}
