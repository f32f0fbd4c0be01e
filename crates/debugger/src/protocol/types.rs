//! Types shared between requests, responses and events.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type ThreadId = i64;
pub type StackFrameId = i64;
pub type VariablesReference = i64;

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
}

/// A source descriptor, used both ways on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// One requested breakpoint position inside a `setBreakpoints` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
}

/// The adapter's verdict on one requested breakpoint. Order matches the
/// request array; `id` may be absent for adapters that do not assign ids.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterBreakpoint {
    pub id: Option<i64>,
    pub verified: bool,
    pub line: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: StackFrameId,
    pub name: String,
    pub source: Option<Source>,
    pub line: i64,
    #[serde(default)]
    pub column: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: VariablesReference,
    #[serde(default)]
    pub expensive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub id: serde_json::Value,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}
