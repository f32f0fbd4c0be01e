//! Typed view of the DAP surface this engine speaks.
//!
//! The transport crate deals in opaque JSON bodies; everything is given a
//! shape here, at the engine boundary. Requests are a tagged enum whose
//! serde representation matches the wire (`command` + `arguments`),
//! responses are parsed per command, and adapter events are normalized
//! into one variant per handled event name with a raw catch-all.

pub mod events;
pub mod requests;
pub mod responses;
pub mod types;

pub use events::AdapterEvent;
pub use requests::RequestBody;
