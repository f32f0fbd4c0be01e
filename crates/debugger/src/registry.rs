//! The map of live sessions and the port allocator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use server::{DebugpyAdapter, ProcessEvent, SpawnConfig};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::bus::{DebugEvent, EventBus};
use crate::error::Error;
use crate::handshake;
use crate::session::{DebugSession, SessionConfig, SessionState};
use crate::Result;

/// Default port of a user-started `debugpy --listen` process. Spawned
/// adapters are allocated ports above it so the two never collide.
pub const USER_ATTACH_PORT: u16 = transport::DEFAULT_DAP_PORT;

const ALLOCATED_PORT_BASE: u16 = USER_ATTACH_PORT + 1;

/// What `list_debug_sessions` reports per session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub script: PathBuf,
    pub state: SessionState,
    pub port: u16,
}

/// Aggregate counts by state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub starting: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
    pub error: usize,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<DebugSession>>>,
    next_port: AtomicU16,
    bus: EventBus,
    removal_tx: mpsc::UnboundedSender<String>,
}

impl SessionRegistry {
    pub fn new(bus: EventBus) -> Arc<Self> {
        let (removal_tx, removal_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            next_port: AtomicU16::new(ALLOCATED_PORT_BASE),
            bus,
            removal_tx,
        });

        tokio::spawn(reap_removals(Arc::downgrade(&registry), removal_rx));

        registry
    }

    /// Ports are handed out strictly increasing and never reused within
    /// this process.
    pub fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::SeqCst)
    }

    /// Spawn an adapter for `script` and establish a session over it.
    /// Any failure tears the partial session (and the subprocess) down
    /// before the error is returned.
    pub async fn start_session(
        &self,
        script: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
    ) -> Result<SessionSummary> {
        let script = resolve_script(script)?;
        let python = server::ensure_debugpy().await?;

        let id = Uuid::new_v4().to_string();
        let port = self.allocate_port();

        let mut spawn = SpawnConfig::new(python, script.clone(), port);
        spawn.args = args;
        spawn.cwd = cwd.clone();
        let (adapter, process_events) = DebugpyAdapter::spawn(spawn)?;
        tokio::spawn(forward_process_events(
            self.bus.clone(),
            id.clone(),
            process_events,
        ));

        let (reader, writer) = match handshake::connect_polling(port).await {
            Ok(halves) => halves,
            Err(e) => {
                adapter.shutdown().await;
                return Err(e);
            }
        };

        let cwd = cwd
            .or_else(|| script.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        let session = DebugSession::new(
            SessionConfig {
                id: id.clone(),
                script: script.clone(),
                port,
                cwd,
            },
            reader,
            writer,
            Some(adapter),
            self.bus.clone(),
            Some(self.removal_tx.clone()),
        );

        if let Err(e) = session.establish().await {
            session.fail().await;
            return Err(e);
        }

        self.insert(session.clone()).await;
        Ok(summarize(&session))
    }

    /// Attach to an adapter the user already started (`debugpy --listen`).
    pub async fn attach_session(&self, script: PathBuf, port: Option<u16>) -> Result<SessionSummary> {
        let script = resolve_script(script)?;
        let port = port.unwrap_or(USER_ATTACH_PORT);

        let (reader, writer) = handshake::connect_once(port).await?;

        let id = Uuid::new_v4().to_string();
        let cwd = script
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let session = DebugSession::new(
            SessionConfig {
                id: id.clone(),
                script: script.clone(),
                port,
                cwd,
            },
            reader,
            writer,
            None,
            self.bus.clone(),
            Some(self.removal_tx.clone()),
        );

        if let Err(e) = session.establish().await {
            session.fail().await;
            return Err(e);
        }

        self.insert(session.clone()).await;
        Ok(summarize(&session))
    }

    pub async fn get(&self, id: &str) -> Result<Arc<DebugSession>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Terminate a session and evict it.
    pub async fn stop_session(&self, id: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(id)
                .ok_or_else(|| Error::SessionNotFound(id.to_string()))?
        };

        session.terminate().await;
        self.bus.publish(DebugEvent::SessionRemoved {
            session_id: id.to_string(),
        });
        Ok(())
    }

    pub async fn list(&self) -> (Vec<SessionSummary>, RegistryStats) {
        let sessions = self.sessions.read().await;

        let mut summaries: Vec<SessionSummary> = sessions.values().map(|s| summarize(s)).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));

        let mut stats = RegistryStats {
            total: summaries.len(),
            ..RegistryStats::default()
        };
        for summary in &summaries {
            match summary.state {
                SessionState::Starting => stats.starting += 1,
                SessionState::Running => stats.running += 1,
                SessionState::Paused => stats.paused += 1,
                SessionState::Stopped => stats.stopped += 1,
                SessionState::Error => stats.error += 1,
            }
        }

        (summaries, stats)
    }

    /// Terminate every session concurrently. Used at server shutdown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<DebugSession>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, s)| s).collect()
        };

        futures::future::join_all(sessions.iter().map(|s| s.terminate())).await;

        for session in sessions {
            self.bus.publish(DebugEvent::SessionRemoved {
                session_id: session.id().to_string(),
            });
        }
    }

    async fn insert(&self, session: Arc<DebugSession>) {
        self.bus.publish(DebugEvent::SessionStarted {
            session_id: session.id().to_string(),
            script: session.script().to_path_buf(),
            port: session.port(),
        });
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session);
    }
}

fn summarize(session: &DebugSession) -> SessionSummary {
    SessionSummary {
        id: session.id().to_string(),
        script: session.script().to_path_buf(),
        state: session.state(),
        port: session.port(),
    }
}

fn resolve_script(script: PathBuf) -> Result<PathBuf> {
    let script = if script.is_absolute() {
        script
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&script))
            .unwrap_or(script)
    };
    if !script.is_file() {
        return Err(Error::InvalidPath(script));
    }
    Ok(script)
}

/// Evict sessions that ended on their own (adapter exit, program exit,
/// socket loss) and release whatever they still hold.
async fn reap_removals(
    registry: Weak<SessionRegistry>,
    mut removal_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(id) = removal_rx.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };

        let removed = registry.sessions.write().await.remove(&id);
        if let Some(session) = removed {
            tracing::debug!(session = %id, "reaping ended session");
            session.shutdown_resources().await;
            registry
                .bus
                .publish(DebugEvent::SessionRemoved { session_id: id });
        }
    }
}

async fn forward_process_events(
    bus: EventBus,
    session_id: String,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Spawned { pid } => {
                tracing::debug!(session = %session_id, ?pid, "adapter process spawned");
            }
            ProcessEvent::Output(line) => bus.publish(DebugEvent::ProgramOutput {
                session_id: session_id.clone(),
                line,
            }),
            ProcessEvent::ErrorOutput(line) => bus.publish(DebugEvent::ProgramError {
                session_id: session_id.clone(),
                line,
            }),
            ProcessEvent::Exited { code, killed } => {
                tracing::debug!(session = %session_id, ?code, killed, "adapter process exited");
            }
        }
    }
}
