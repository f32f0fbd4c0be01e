//! Renders bus events into the tracing log on stderr.

use debugger::DebugEvent;
use tokio::sync::broadcast;

/// Consume bus events until the bus itself is dropped. A slow consumer
/// that lags simply skips ahead; debugging continues regardless.
pub async fn run_formatter(mut events: broadcast::Receiver<DebugEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => render(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "log formatter lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render(event: DebugEvent) {
    match event {
        DebugEvent::SessionStarted {
            session_id,
            script,
            port,
        } => {
            tracing::info!(session = %session_id, script = %script.display(), port, "session started");
        }
        DebugEvent::SessionRemoved { session_id } => {
            tracing::info!(session = %session_id, "session removed");
        }
        DebugEvent::StateChanged { session_id, state } => {
            tracing::info!(session = %session_id, %state, "state changed");
        }
        DebugEvent::Paused {
            session_id,
            reason,
            thread_id,
            location,
        } => match location {
            Some(location) => {
                let file = location
                    .file
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                tracing::info!(
                    session = %session_id,
                    reason = %reason,
                    thread = thread_id,
                    file = %file,
                    line = location.line,
                    function = %location.function,
                    "paused"
                );
            }
            None => {
                tracing::info!(session = %session_id, reason = %reason, thread = thread_id, "paused");
            }
        },
        DebugEvent::Resumed { session_id } => {
            tracing::info!(session = %session_id, "resumed");
        }
        DebugEvent::ProgramOutput { session_id, line } => {
            tracing::info!(session = %session_id, %line, "program output");
        }
        DebugEvent::ProgramError { session_id, line } => {
            tracing::error!(session = %session_id, %line, "program error");
        }
        DebugEvent::Exited {
            session_id,
            exit_code,
            normal,
        } => {
            if normal {
                tracing::info!(session = %session_id, exit_code, "program exited");
            } else {
                tracing::error!(session = %session_id, exit_code, "program exited abnormally");
            }
        }
        DebugEvent::Adapter {
            session_id,
            name,
            body,
        } => {
            tracing::debug!(session = %session_id, event = %name, ?body, "adapter event");
        }
    }
}
