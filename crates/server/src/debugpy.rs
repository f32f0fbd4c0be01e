//! The debugpy adapter subprocess.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::output::{is_bootstrap_noise, is_error_line};
use crate::ServerError;

/// How long a SIGTERM'd adapter gets before SIGKILL.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// How to launch the adapter.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub python: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub port: u16,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl SpawnConfig {
    pub fn new(python: impl Into<String>, script: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            python: python.into(),
            script: script.into(),
            args: Vec::new(),
            port,
            cwd: None,
            env: HashMap::new(),
        }
    }
}

/// Lifecycle and output notifications from the supervised process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Spawned { pid: Option<u32> },
    /// A line of ordinary program output.
    Output(String),
    /// A line classified as program error output.
    ErrorOutput(String),
    Exited { code: Option<i32>, killed: bool },
}

#[derive(Debug)]
enum Control {
    Shutdown(oneshot::Sender<()>),
}

/// Handle on a spawned adapter. The child itself lives in a background
/// task; the handle can only ask it to shut down.
#[derive(Debug)]
pub struct DebugpyAdapter {
    pid: Option<u32>,
    ctrl_tx: mpsc::UnboundedSender<Control>,
}

impl DebugpyAdapter {
    /// Spawn `python -m debugpy --listen 127.0.0.1:<port> --wait-for-client
    /// <script> [args…]` and start watching it. Output and lifecycle
    /// notifications arrive on the returned channel.
    pub fn spawn(
        config: SpawnConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>), ServerError> {
        let addr = format!("127.0.0.1:{}", config.port);
        tracing::debug!(script = %config.script.display(), %addr, "spawning debug adapter");

        let mut command = Command::new(&config.python);
        command
            .arg("-m")
            .arg("debugpy")
            .arg("--listen")
            .arg(&addr)
            .arg("--wait-for-client")
            .arg(&config.script)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(ServerError::Spawn)?;
        let pid = child.id();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(ProcessEvent::Spawned { pid });

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(stdout, event_tx.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(stderr, event_tx.clone(), true));
        }

        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        tokio::spawn(watch_child(child, ctrl_rx, event_tx));

        Ok((Self { pid, ctrl_tx }, event_rx))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Terminate the adapter: SIGTERM, wait out the grace period, then
    /// SIGKILL. Completes immediately if the process already exited.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.ctrl_tx.send(Control::Shutdown(done_tx)).is_err() {
            // Watcher gone: the child has already been reaped.
            return;
        }
        let _ = done_rx.await;
    }
}

async fn read_lines<R>(
    stream: R,
    events: mpsc::UnboundedSender<ProcessEvent>,
    is_stderr: bool,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if is_stderr && is_bootstrap_noise(&line) {
            tracing::trace!(%line, "suppressed adapter bootstrap line");
            continue;
        }
        let event = if is_stderr || is_error_line(&line) {
            ProcessEvent::ErrorOutput(line)
        } else {
            ProcessEvent::Output(line)
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

async fn watch_child(
    mut child: Child,
    mut ctrl_rx: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    tokio::select! {
        status = child.wait() => {
            let code = status.ok().and_then(|s| s.code());
            tracing::debug!(?code, "debug adapter exited on its own");
            let _ = events.send(ProcessEvent::Exited { code, killed: false });
        }
        ctrl = ctrl_rx.recv() => {
            if let Some(Control::Shutdown(done)) = ctrl {
                let (code, killed) = terminate(&mut child).await;
                let _ = events.send(ProcessEvent::Exited { code, killed });
                let _ = done.send(());
            }
        }
    }
}

/// SIGTERM, grace period, SIGKILL. Returns the exit code (if any) and
/// whether the hard kill was needed.
async fn terminate(child: &mut Child) -> (Option<i32>, bool) {
    if let Some(pid) = child.id() {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM failed; process likely gone");
        }
    }

    match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
        Ok(status) => (status.ok().and_then(|s| s.code()), false),
        Err(_) => {
            tracing::warn!("adapter ignored SIGTERM, killing");
            let _ = child.kill().await;
            (None, true)
        }
    }
}
