//! Adapter events, normalized at the engine boundary.
//!
//! The wire gives us `{event: <name>, body: <blob>}`. Each handled name
//! gets a typed variant here; anything else (debugpy emits several custom
//! events) is kept raw in [`AdapterEvent::Unknown`] and forwarded to the
//! event bus untouched. A body that fails to parse also lands in
//! `Unknown` rather than tearing down the read loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Module, ThreadId};

#[derive(Debug, Clone)]
pub enum AdapterEvent {
    Initialized,
    Stopped(StoppedBody),
    Continued(ContinuedBody),
    Terminated,
    Exited(ExitedBody),
    Output(OutputBody),
    Thread(ThreadBody),
    Module(ModuleBody),
    Breakpoint(BreakpointChangeBody),
    Process(ProcessBody),
    Unknown { name: String, body: Option<Value> },
}

impl AdapterEvent {
    /// Normalize a wire event into a typed variant.
    pub fn from_wire(event: transport::Event) -> Self {
        let transport::Event {
            event: name, body, ..
        } = event;

        fn parse<T: for<'de> Deserialize<'de>>(body: &Option<Value>) -> Option<T> {
            serde_json::from_value(body.clone().unwrap_or(Value::Null)).ok()
        }

        let parsed = match name.as_str() {
            "initialized" => Some(AdapterEvent::Initialized),
            "terminated" => Some(AdapterEvent::Terminated),
            "stopped" => parse(&body).map(AdapterEvent::Stopped),
            "continued" => parse(&body).map(AdapterEvent::Continued),
            "exited" => parse(&body).map(AdapterEvent::Exited),
            "output" => parse(&body).map(AdapterEvent::Output),
            "thread" => parse(&body).map(AdapterEvent::Thread),
            "module" => parse(&body).map(AdapterEvent::Module),
            "breakpoint" => parse(&body).map(AdapterEvent::Breakpoint),
            "process" => parse(&body).map(AdapterEvent::Process),
            _ => None,
        };

        parsed.unwrap_or(AdapterEvent::Unknown { name, body })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedBody {
    pub reason: String,
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub hit_breakpoint_ids: Vec<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedBody {
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub all_threads_continued: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedBody {
    pub exit_code: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputBody {
    #[serde(default)]
    pub category: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadBody {
    pub reason: String,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleBody {
    pub reason: String,
    pub module: Module,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointChangeBody {
    pub reason: String,
    pub breakpoint: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    pub name: String,
    pub start_method: Option<String>,
}
