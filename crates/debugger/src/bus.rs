//! In-process publish/subscribe hub for structured debug events.
//!
//! Sessions, the supervisor forwarder and the registry all publish here;
//! the log formatter and any UI broadcaster subscribe. The hub is passed
//! into components explicitly; there is no global.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::session::SessionState;

const BUS_CAPACITY: usize = 1024;

/// Where the debuggee is paused.
#[derive(Debug, Clone, Serialize)]
pub struct SourceLocation {
    pub file: Option<PathBuf>,
    pub line: i64,
    pub function: String,
}

/// Everything observable about the fleet of debug sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugEvent {
    SessionStarted {
        session_id: String,
        script: PathBuf,
        port: u16,
    },
    SessionRemoved {
        session_id: String,
    },
    StateChanged {
        session_id: String,
        state: SessionState,
    },
    Paused {
        session_id: String,
        reason: String,
        thread_id: i64,
        location: Option<SourceLocation>,
    },
    Resumed {
        session_id: String,
    },
    ProgramOutput {
        session_id: String,
        line: String,
    },
    ProgramError {
        session_id: String,
        line: String,
    },
    Exited {
        session_id: String,
        exit_code: i64,
        normal: bool,
    },
    /// Unhandled adapter event, forwarded raw.
    Adapter {
        session_id: String,
        name: String,
        body: Option<serde_json::Value>,
    },
}

/// Cloneable handle onto the broadcast channel. Publishing never blocks
/// and never fails; with no subscribers events simply evaporate.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DebugEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DebugEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_each_see_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(DebugEvent::Resumed {
            session_id: "s1".to_string(),
        });

        assert!(matches!(a.recv().await.unwrap(), DebugEvent::Resumed { .. }));
        assert!(matches!(b.recv().await.unwrap(), DebugEvent::Resumed { .. }));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(DebugEvent::SessionRemoved {
            session_id: "gone".to_string(),
        });
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new();
        bus.publish(DebugEvent::Resumed {
            session_id: "s1".to_string(),
        });

        let mut late = bus.subscribe();
        bus.publish(DebugEvent::SessionRemoved {
            session_id: "s1".to_string(),
        });

        assert!(matches!(
            late.recv().await.unwrap(),
            DebugEvent::SessionRemoved { .. }
        ));
    }
}
