//! Response bodies, parsed per command.

use serde::Deserialize;

use super::types::{AdapterBreakpoint, Scope, StackFrame, Thread, Variable};

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<AdapterBreakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: String,
    #[serde(rename = "type")]
    pub ty: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_trace_parses_frames_with_sources() {
        let body: StackTraceResponse = serde_json::from_value(serde_json::json!({
            "stackFrames": [
                {"id": 10, "name": "f", "source": {"path": "/t/a.py"}, "line": 25, "column": 1}
            ],
            "totalFrames": 1
        }))
        .unwrap();

        assert_eq!(body.stack_frames.len(), 1);
        let frame = &body.stack_frames[0];
        assert_eq!(frame.id, 10);
        assert_eq!(frame.line, 25);
        assert_eq!(
            frame.source.as_ref().unwrap().path.as_ref().unwrap(),
            std::path::Path::new("/t/a.py")
        );
    }

    #[test]
    fn breakpoints_tolerate_missing_ids() {
        let body: SetBreakpointsResponse = serde_json::from_value(serde_json::json!({
            "breakpoints": [
                {"verified": true, "line": 10},
                {"id": 7, "verified": false}
            ]
        }))
        .unwrap();

        assert_eq!(body.breakpoints[0].id, None);
        assert!(body.breakpoints[0].verified);
        assert_eq!(body.breakpoints[1].id, Some(7));
    }
}
