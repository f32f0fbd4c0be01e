//! Supervision of the debugpy adapter subprocess.
//!
//! The engine never talks to the Python interpreter directly except
//! through this crate: probing that debugpy is installed, spawning the
//! adapter in listen-and-wait mode, sorting its output into program
//! output vs. program errors, and taking it down again (SIGTERM, a grace
//! period, then SIGKILL).

mod debugpy;
pub mod output;

pub use debugpy::{DebugpyAdapter, ProcessEvent, SpawnConfig, TERMINATION_GRACE};

use std::time::Duration;

use tokio::process::Command;

/// Budget for each probe invocation of the interpreter.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interpreter names tried in order when probing.
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("no python interpreter found on PATH")]
    PythonMissing,

    #[error("debugpy is not installed for {python}: {detail}")]
    DebugpyMissing { python: String, detail: String },

    #[error("failed to spawn debug adapter: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What `check_python_setup` reports to the user.
#[derive(Debug, Clone, Default)]
pub struct PythonSetup {
    pub python: Option<String>,
    pub python_version: Option<String>,
    pub debugpy_version: Option<String>,
}

impl PythonSetup {
    pub fn debugpy_available(&self) -> bool {
        self.debugpy_version.is_some()
    }
}

async fn capture(cmd: &str, args: &[&str]) -> Option<std::process::Output> {
    let fut = Command::new(cmd).args(args).kill_on_drop(true).output();
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            tracing::debug!(cmd, error = %e, "probe command failed to run");
            None
        }
        Err(_) => {
            tracing::warn!(cmd, "probe command timed out");
            None
        }
    }
}

/// Find a working interpreter, returning its name and version line.
pub async fn detect_python() -> Option<(String, String)> {
    for candidate in PYTHON_CANDIDATES {
        if let Some(output) = capture(candidate, &["--version"]).await {
            if output.status.success() {
                // Old interpreters print the version on stderr.
                let raw = if output.stdout.is_empty() {
                    output.stderr
                } else {
                    output.stdout
                };
                let version = String::from_utf8_lossy(&raw).trim().to_string();
                return Some((candidate.to_string(), version));
            }
        }
    }
    None
}

/// Probe the interpreter and debugpy without side effects.
pub async fn check_python_setup() -> PythonSetup {
    let Some((python, python_version)) = detect_python().await else {
        return PythonSetup::default();
    };

    let debugpy_version = match capture(
        &python,
        &["-c", "import debugpy; print(debugpy.__version__)"],
    )
    .await
    {
        Some(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        _ => None,
    };

    PythonSetup {
        python: Some(python),
        python_version: Some(python_version),
        debugpy_version,
    }
}

/// Verify the toolchain before a spawn, returning the interpreter to use.
/// A missing module aborts session start with a dedicated error rather
/// than letting the real spawn fail obscurely.
pub async fn ensure_debugpy() -> Result<String, ServerError> {
    let Some((python, _)) = detect_python().await else {
        return Err(ServerError::PythonMissing);
    };

    match capture(&python, &["-c", "import debugpy"]).await {
        Some(output) if output.status.success() => Ok(python),
        Some(output) => Err(ServerError::DebugpyMissing {
            python,
            detail: String::from_utf8_lossy(&output.stderr)
                .lines()
                .last()
                .unwrap_or("import failed")
                .to_string(),
        }),
        None => Err(ServerError::DebugpyMissing {
            python,
            detail: "probe did not complete".to_string(),
        }),
    }
}
