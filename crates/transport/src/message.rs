//! Raw DAP message envelopes.
//!
//! These types mirror the wire shape of the protocol: every body is kept
//! as an opaque [`serde_json::Value`] blob. The `debugger` crate normalizes
//! bodies into typed variants at its boundary; the transport stays agnostic.

use serde::{Deserialize, Serialize};

/// Sequence number used for ordering and request/response correlation.
pub type Seq = i64;

/// A message received from the debug adapter, dispatched on its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Reply to a request previously sent by this client.
    Response(Response),
    /// Asynchronous notification about debuggee or adapter state.
    Event(Event),
    /// Reverse request from the adapter. This system never services these;
    /// the client layer drops them.
    Request(Request),
}

/// A reply from the adapter, matched to its request by `request_seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub seq: Seq,
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    /// Human-readable error when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// An asynchronous notification, keyed by its `event` name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A request frame. Outgoing on the client side; incoming only as a
/// reverse request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// A response written by this side of the connection. Real clients never
/// send these; the scripted adapter in tests does.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingResponse {
    pub seq: Seq,
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// An event written by this side of the connection (test adapters only).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEvent {
    pub seq: Seq,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A message to encode onto the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Request(Request),
    Response(OutgoingResponse),
    Event(OutgoingEvent),
}
