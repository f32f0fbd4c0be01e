//! One debug session: identity, state machine, context cache, operations.
//!
//! All state transitions driven by adapter events run on the session's
//! event loop task, one event at a time. Tool-facing operations check
//! their preconditions against the context under a short-lived lock and
//! never hold it across an adapter round trip, so a `terminate` can always
//! cut in. Once a session reaches `Stopped` or `Error` it is inert: no
//! operation is accepted and no event mutates it again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use server::DebugpyAdapter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use transport::{DapReader, DapWriter};

use crate::breakpoints::{Breakpoint, BreakpointTable};
use crate::bus::{DebugEvent, EventBus, SourceLocation};
use crate::client::DapClient;
use crate::error::Error;
use crate::handshake;
use crate::protocol::events::{AdapterEvent, ContinuedBody, ExitedBody, OutputBody, StoppedBody};
use crate::protocol::types::{StackFrame, StackFrameId, ThreadId};
use crate::Result;

/// Attempts at fetching the stack trace after a stop (one try plus two
/// retries).
const STACK_FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Paused,
    Stopped,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Error)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Which scopes `get_variables` should include. Matching is a
/// case-insensitive substring test on the adapter's scope names, which
/// fits debugpy's "Locals"/"Globals"; adapters for other runtimes may
/// name scopes differently and would need a different mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Local,
    Global,
    All,
}

impl ScopeFilter {
    pub fn matches(self, scope_name: &str) -> bool {
        let name = scope_name.to_lowercase();
        match self {
            ScopeFilter::Local => name.contains("local"),
            ScopeFilter::Global => name.contains("global"),
            ScopeFilter::All => true,
        }
    }
}

impl std::str::FromStr for ScopeFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ScopeFilter::Local),
            "global" => Ok(ScopeFilter::Global),
            "all" => Ok(ScopeFilter::All),
            other => Err(Error::InvalidScope(other.to_string())),
        }
    }
}

/// A variable tagged with the scope it came from.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedVariable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub scope: String,
}

/// One frame of the call stack, as reported to tools.
#[derive(Debug, Clone, Serialize)]
pub struct StackEntry {
    pub name: String,
    pub file: Option<PathBuf>,
    pub line: i64,
}

/// Result of an expression evaluation. Adapter-side failures come back
/// here with `error == true`, never as a raised error.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateOutcome {
    pub result: String,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub error: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub id: String,
    pub script: PathBuf,
    pub port: u16,
    pub cwd: PathBuf,
}

#[derive(Debug)]
struct Context {
    state: SessionState,
    thread_id: Option<ThreadId>,
    frame_id: Option<StackFrameId>,
}

#[derive(Debug)]
pub struct DebugSession {
    id: String,
    script: PathBuf,
    port: u16,
    cwd: PathBuf,
    started_at: DateTime<Utc>,
    client: DapClient,
    adapter: Option<DebugpyAdapter>,
    context: Mutex<Context>,
    breakpoints: tokio::sync::Mutex<BreakpointTable>,
    bus: EventBus,
    torn_down: AtomicBool,
    removal_tx: Option<mpsc::UnboundedSender<String>>,
}

impl DebugSession {
    /// Build a session over an established connection and start its event
    /// loop. The session owns the adapter subprocess when one was spawned
    /// for it; in attach-only mode there is none.
    pub fn new<R, W>(
        config: SessionConfig,
        reader: DapReader<R>,
        writer: DapWriter<W>,
        adapter: Option<DebugpyAdapter>,
        bus: EventBus,
        removal_tx: Option<mpsc::UnboundedSender<String>>,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (client, events) = DapClient::new(reader, writer);

        let session = Arc::new(Self {
            id: config.id,
            script: config.script,
            port: config.port,
            cwd: config.cwd,
            started_at: Utc::now(),
            client,
            adapter,
            context: Mutex::new(Context {
                state: SessionState::Starting,
                thread_id: None,
                frame_id: None,
            }),
            breakpoints: tokio::sync::Mutex::new(BreakpointTable::default()),
            bus,
            torn_down: AtomicBool::new(false),
            removal_tx,
        });

        tokio::spawn(run_event_loop(Arc::clone(&session), events));

        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.context.lock().unwrap().state
    }

    pub fn current_thread_id(&self) -> Option<ThreadId> {
        self.context.lock().unwrap().thread_id
    }

    pub fn current_frame_id(&self) -> Option<StackFrameId> {
        self.context.lock().unwrap().frame_id
    }

    /// Run the handshake and move the session into `Running`.
    pub async fn establish(&self) -> Result<()> {
        let primed = handshake::run(&self.client, self.port, &self.cwd).await?;

        {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                return Err(Error::SessionEnded);
            }
            ctx.state = SessionState::Running;
            ctx.thread_id = primed.thread_id;
            ctx.frame_id = primed.frame_id;
        }
        self.publish_state(SessionState::Running);
        Ok(())
    }

    /// Mark the session failed and release its resources. Used when the
    /// handshake (or anything else during startup) fails so a
    /// half-constructed session never lingers.
    pub async fn fail(&self) {
        let changed = {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                false
            } else {
                ctx.state = SessionState::Error;
                true
            }
        };
        if changed {
            self.publish_state(SessionState::Error);
        }
        self.shutdown_resources().await;
    }

    /// Add a breakpoint. The whole desired line set for the file is sent
    /// so the adapter treats it as an absolute replacement; the cache is
    /// rebuilt from the adapter's verdicts.
    pub async fn set_breakpoint(&self, file: &Path, line: i64) -> Result<Breakpoint> {
        if line < 1 {
            return Err(Error::InvalidLine(line));
        }
        self.ensure_active()?;

        let mut table = self.breakpoints.lock().await;
        let lines = table.lines_with(file, line);
        let reply = self.client.set_breakpoints(file, &lines).await?;
        let entries = table.apply_reply(file, &lines, &reply);

        let index = lines
            .iter()
            .position(|&l| l == line)
            .expect("requested line is part of the set");
        Ok(entries[index].clone())
    }

    /// Remove a breakpoint, again via absolute replacement. Removing the
    /// last line for a file sends an empty list so the adapter clears it.
    pub async fn remove_breakpoint(&self, file: &Path, line: i64) -> Result<()> {
        self.ensure_active()?;

        let mut table = self.breakpoints.lock().await;
        let lines = table.lines_without(file, line);
        let reply = self.client.set_breakpoints(file, &lines).await?;
        table.apply_reply(file, &lines, &reply);
        Ok(())
    }

    /// The cached breakpoint picture, optionally narrowed to one file.
    pub async fn list_breakpoints(&self, file: Option<&Path>) -> Vec<Breakpoint> {
        let table = self.breakpoints.lock().await;
        match file {
            Some(file) => table.for_file(file),
            None => table.all(),
        }
    }

    pub async fn continue_(&self) -> Result<()> {
        let thread_id = self.paused_thread()?;
        self.client.continue_(thread_id).await
    }

    pub async fn step_over(&self) -> Result<()> {
        let thread_id = self.paused_thread()?;
        self.client.next(thread_id).await
    }

    pub async fn step_in(&self) -> Result<()> {
        let thread_id = self.paused_thread()?;
        self.client.step_in(thread_id).await
    }

    pub async fn step_out(&self) -> Result<()> {
        let thread_id = self.paused_thread()?;
        self.client.step_out(thread_id).await
    }

    /// Variables of the current frame, filtered by scope and tagged with
    /// the scope they came from.
    pub async fn get_variables(&self, filter: ScopeFilter) -> Result<Vec<TaggedVariable>> {
        let frame_id = self.paused_frame()?;

        let scopes = self.client.scopes(frame_id).await?;
        let mut out = Vec::new();
        for scope in scopes.into_iter().filter(|s| filter.matches(&s.name)) {
            let variables = self.client.variables(scope.variables_reference).await?;
            out.extend(variables.into_iter().map(|v| TaggedVariable {
                name: v.name,
                value: v.value,
                ty: v.ty,
                scope: scope.name.clone(),
            }));
        }
        Ok(out)
    }

    pub async fn get_call_stack(&self) -> Result<Vec<StackEntry>> {
        let thread_id = self.paused_thread()?;

        let frames = self.client.stack_trace(thread_id).await?;
        Ok(frames
            .into_iter()
            .map(|f| StackEntry {
                name: f.name,
                file: f.source.and_then(|s| s.path),
                line: f.line,
            })
            .collect())
    }

    pub async fn evaluate(&self, expression: &str) -> Result<EvaluateOutcome> {
        let frame_id = self.paused_frame()?;

        match self.client.evaluate(expression, frame_id).await {
            Ok(response) => Ok(EvaluateOutcome {
                result: response.result,
                ty: response.ty,
                error: false,
            }),
            Err(Error::Adapter { message, .. }) => Ok(EvaluateOutcome {
                result: message,
                ty: None,
                error: true,
            }),
            Err(e) => Err(e),
        }
    }

    /// Stop the session: mark it `Stopped`, close the DAP socket (which
    /// rejects every pending request with a disconnection error) and take
    /// down the adapter subprocess if this session owns one.
    pub async fn terminate(&self) {
        let changed = {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                false
            } else {
                ctx.state = SessionState::Stopped;
                true
            }
        };
        if changed {
            self.publish_state(SessionState::Stopped);
        }
        self.shutdown_resources().await;
    }

    /// Idempotent resource teardown shared by every path out of a session.
    pub(crate) async fn shutdown_resources(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.client.disconnect();
        self.client.shutdown();
        if let Some(adapter) = &self.adapter {
            adapter.shutdown().await;
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state().is_terminal() {
            Err(Error::SessionEnded)
        } else {
            Ok(())
        }
    }

    fn paused_thread(&self) -> Result<ThreadId> {
        let ctx = self.context.lock().unwrap();
        if ctx.state.is_terminal() {
            return Err(Error::SessionEnded);
        }
        if ctx.state != SessionState::Paused {
            return Err(Error::NoActiveThread);
        }
        ctx.thread_id.ok_or(Error::NoActiveThread)
    }

    fn paused_frame(&self) -> Result<StackFrameId> {
        let ctx = self.context.lock().unwrap();
        if ctx.state.is_terminal() {
            return Err(Error::SessionEnded);
        }
        if ctx.state != SessionState::Paused {
            return Err(Error::NoActiveFrame);
        }
        ctx.frame_id.ok_or(Error::NoActiveFrame)
    }

    fn publish_state(&self, state: SessionState) {
        self.bus.publish(DebugEvent::StateChanged {
            session_id: self.id.clone(),
            state,
        });
    }

    fn notify_removal(&self) {
        if let Some(tx) = &self.removal_tx {
            let _ = tx.send(self.id.clone());
        }
    }

    // Event-driven transitions. Each runs to completion on the event loop
    // before the next event is looked at.

    async fn on_stopped(&self, body: StoppedBody) {
        let Some(thread_id) = body.thread_id else {
            tracing::warn!(session = %self.id, "stopped event without a thread id");
            return;
        };

        {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                return;
            }
            ctx.thread_id = Some(thread_id);
        }

        let top = self.fetch_top_frame(thread_id).await;

        {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                return;
            }
            ctx.state = SessionState::Paused;
            ctx.frame_id = top.as_ref().map(|f| f.id);
        }

        self.publish_state(SessionState::Paused);
        self.bus.publish(DebugEvent::Paused {
            session_id: self.id.clone(),
            reason: body.reason,
            thread_id,
            location: top.map(|f| SourceLocation {
                file: f.source.and_then(|s| s.path),
                line: f.line,
                function: f.name,
            }),
        });
    }

    async fn fetch_top_frame(&self, thread_id: ThreadId) -> Option<StackFrame> {
        for attempt in 1..=STACK_FETCH_ATTEMPTS {
            match self.client.stack_trace(thread_id).await {
                Ok(frames) => return frames.into_iter().next(),
                Err(Error::Disconnected) => return None,
                Err(e) => {
                    tracing::warn!(
                        session = %self.id,
                        attempt,
                        error = %e,
                        "stack trace after stop failed"
                    );
                }
            }
        }
        None
    }

    fn on_continued(&self, body: ContinuedBody) {
        {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                return;
            }
            ctx.state = SessionState::Running;
            ctx.frame_id = None;
            if let Some(thread_id) = body.thread_id {
                ctx.thread_id = Some(thread_id);
            }
        }
        self.publish_state(SessionState::Running);
        self.bus.publish(DebugEvent::Resumed {
            session_id: self.id.clone(),
        });
    }

    fn on_terminated(&self) {
        let changed = {
            let mut ctx = self.context.lock().unwrap();
            if ctx.state.is_terminal() {
                false
            } else {
                ctx.state = SessionState::Stopped;
                true
            }
        };
        if changed {
            self.publish_state(SessionState::Stopped);
            self.notify_removal();
        }
    }

    fn on_exited(&self, body: ExitedBody) {
        let normal = body.exit_code == 0;
        self.bus.publish(DebugEvent::Exited {
            session_id: self.id.clone(),
            exit_code: body.exit_code,
            normal,
        });
        if !normal {
            tracing::warn!(session = %self.id, code = body.exit_code, "program exited abnormally");
        }
        self.on_terminated();
    }

    fn on_output(&self, body: OutputBody) {
        let line = body.output.trim_end().to_string();
        if line.is_empty() {
            return;
        }
        let stderr = body.category.as_deref() == Some("stderr");
        let event = if stderr || server::output::is_error_line(&line) {
            DebugEvent::ProgramError {
                session_id: self.id.clone(),
                line,
            }
        } else {
            DebugEvent::ProgramOutput {
                session_id: self.id.clone(),
                line,
            }
        };
        self.bus.publish(event);
    }

    fn forward_informational(&self, name: &str, body: Option<serde_json::Value>) {
        self.bus.publish(DebugEvent::Adapter {
            session_id: self.id.clone(),
            name: name.to_string(),
            body,
        });
    }
}

async fn run_event_loop(
    session: Arc<DebugSession>,
    mut events: mpsc::UnboundedReceiver<AdapterEvent>,
) {
    while let Some(event) = events.recv().await {
        tracing::trace!(session = %session.id, ?event, "adapter event");
        match event {
            AdapterEvent::Initialized => {
                // The handshake rendezvous consumed this; nothing to do.
            }
            AdapterEvent::Stopped(body) => session.on_stopped(body).await,
            AdapterEvent::Continued(body) => session.on_continued(body),
            AdapterEvent::Terminated => session.on_terminated(),
            AdapterEvent::Exited(body) => session.on_exited(body),
            AdapterEvent::Output(body) => session.on_output(body),
            AdapterEvent::Thread(body) => {
                session.forward_informational("thread", serde_json::to_value(&body).ok())
            }
            AdapterEvent::Module(body) => {
                session.forward_informational("module", serde_json::to_value(&body).ok())
            }
            AdapterEvent::Breakpoint(body) => {
                session.forward_informational("breakpoint", serde_json::to_value(&body).ok())
            }
            AdapterEvent::Process(body) => {
                session.forward_informational("process", serde_json::to_value(&body).ok())
            }
            AdapterEvent::Unknown { name, body } => session.forward_informational(&name, body),
        }
    }

    // Socket gone. If the adapter never said goodbye, the session still
    // winds down toward Stopped.
    tracing::debug!(session = %session.id, "event channel closed");
    session.on_terminated();
}
