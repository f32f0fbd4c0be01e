//! Debug-session engine.
//!
//! One [`DebugSession`] owns the relationship between this process, a
//! debug adapter reachable over TCP, and the Python program running under
//! it. The session delegates wire work to its [`DapClient`] (framing via
//! the `transport` crate, request/response correlation, event routing),
//! runs the initialization handshake, caches the current thread/frame
//! context, and reconciles breakpoints with the adapter. The
//! [`SessionRegistry`] tracks every live session and allocates adapter
//! ports; the [`EventBus`] fans structured debug events out to whatever
//! wants them (log formatter, UI).

mod breakpoints;
mod bus;
mod client;
mod error;
mod handshake;
pub mod protocol;
mod registry;
mod session;
pub mod testing;

pub use breakpoints::Breakpoint;
pub use bus::{DebugEvent, EventBus, SourceLocation};
pub use client::DapClient;
pub use error::Error;
pub use registry::{RegistryStats, SessionRegistry, SessionSummary, USER_ATTACH_PORT};
pub use session::{
    DebugSession, EvaluateOutcome, ScopeFilter, SessionConfig, SessionState, StackEntry,
    TaggedVariable,
};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
