//! Requests this client sends to the adapter.
//!
//! The serde representation is exactly the wire layout: the enum tag
//! becomes the `command` field and the variant payload the `arguments`
//! object, so a body serializes straight into a request frame.

use std::path::PathBuf;

use serde::Serialize;

use super::types::{Source, SourceBreakpoint, StackFrameId, ThreadId, VariablesReference};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
pub enum RequestBody {
    Initialize(Initialize),
    Attach(Attach),
    SetBreakpoints(SetBreakpoints),
    Threads,
    StackTrace(StackTrace),
    Scopes(Scopes),
    Variables(Variables),
    Evaluate(Evaluate),
    Continue(Continue),
    Next(Next),
    StepIn(StepIn),
    StepOut(StepOut),
    Pause(Pause),
    ConfigurationDone,
    Disconnect(Disconnect),
}

impl RequestBody {
    /// The wire command name for this request.
    pub fn command(&self) -> &'static str {
        match self {
            RequestBody::Initialize(_) => "initialize",
            RequestBody::Attach(_) => "attach",
            RequestBody::SetBreakpoints(_) => "setBreakpoints",
            RequestBody::Threads => "threads",
            RequestBody::StackTrace(_) => "stackTrace",
            RequestBody::Scopes(_) => "scopes",
            RequestBody::Variables(_) => "variables",
            RequestBody::Evaluate(_) => "evaluate",
            RequestBody::Continue(_) => "continue",
            RequestBody::Next(_) => "next",
            RequestBody::StepIn(_) => "stepIn",
            RequestBody::StepOut(_) => "stepOut",
            RequestBody::Pause(_) => "pause",
            RequestBody::ConfigurationDone => "configurationDone",
            RequestBody::Disconnect(_) => "disconnect",
        }
    }

    /// The `arguments` object, or `None` for argument-less commands.
    pub fn arguments(&self) -> Option<serde_json::Value> {
        let value = serde_json::to_value(self).expect("request bodies always serialize");
        value.get("arguments").cloned()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialize {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_name: String,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    pub path_format: String,
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at_one: bool,
    #[serde(rename = "columnsStartAt1")]
    pub columns_start_at_one: bool,
    pub supports_variable_type: bool,
    pub supports_variable_paging: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMapping {
    pub local_root: PathBuf,
    pub remote_root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attach {
    pub connect: ConnectInfo,
    pub path_mappings: Vec<PathMapping>,
    pub just_my_code: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpoints {
    pub source: Source,
    pub breakpoints: Vec<SourceBreakpoint>,
    pub source_modified: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scopes {
    pub frame_id: StackFrameId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<StackFrameId>,
    pub context: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Continue {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Next {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIn {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOut {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disconnect {
    pub terminate_debuggee: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_matches_serde_tag() {
        let body = RequestBody::StackTrace(StackTrace { thread_id: 1 });
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["command"], body.command());
        assert_eq!(value["arguments"]["threadId"], 1);
    }

    #[test]
    fn argument_less_commands_have_no_arguments() {
        assert!(RequestBody::Threads.arguments().is_none());
        assert!(RequestBody::ConfigurationDone.arguments().is_none());
    }

    #[test]
    fn initialize_uses_dap_field_casing() {
        let body = RequestBody::Initialize(Initialize {
            client_id: "bridge".to_string(),
            client_name: "bridge".to_string(),
            adapter_id: "debugpy".to_string(),
            path_format: "path".to_string(),
            lines_start_at_one: true,
            columns_start_at_one: true,
            supports_variable_type: true,
            supports_variable_paging: true,
        });

        let args = body.arguments().unwrap();
        assert_eq!(args["clientID"], "bridge");
        assert_eq!(args["adapterID"], "debugpy");
        assert_eq!(args["linesStartAt1"], true);
        assert_eq!(args["pathFormat"], "path");
    }

    #[test]
    fn attach_carries_path_mappings_and_just_my_code() {
        let cwd = PathBuf::from("/work");
        let body = RequestBody::Attach(Attach {
            connect: ConnectInfo {
                host: "localhost".to_string(),
                port: 5679,
            },
            path_mappings: vec![PathMapping {
                local_root: cwd.clone(),
                remote_root: cwd,
            }],
            just_my_code: false,
        });

        let args = body.arguments().unwrap();
        assert_eq!(args["connect"]["port"], 5679);
        assert_eq!(args["justMyCode"], false);
        assert_eq!(args["pathMappings"][0]["localRoot"], "/work");
        assert_eq!(args["pathMappings"][0]["remoteRoot"], "/work");
    }
}
