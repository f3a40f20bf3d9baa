//! Wire types for the newline-delimited JSON request/response protocol.
//!
//! Grounded on the reference client's exact field names (`curserve_client.py`): requests carry
//! a `type` tag, responses carry `response_status` plus either `text` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "alloc_pid")]
    AllocPid { pid: u32, repo_dir_path: String },
    #[serde(rename = "request_ripgrep")]
    RequestRipgrep {
        pid: u32,
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
    },
}

impl Request {
    /// Parses one line of input. Unknown `type` values produce a protocol error rather than a
    /// hard parse failure, per the "never drop the connection on a bad frame" contract.
    pub fn parse(line: &str) -> Result<Request, String> {
        let value: Value = serde_json::from_str(line).map_err(|e| format!("malformed request: {e}"))?;
        match value.get("type").and_then(Value::as_str) {
            Some("alloc_pid") | Some("request_ripgrep") => {
                serde_json::from_value(value).map_err(|e| format!("malformed request: {e}"))
            }
            Some(_) => Err("unknown request type".to_string()),
            None => Err("missing request type".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub response_status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(text: String) -> Response {
        Response { response_status: 1, text: Some(text), error: None }
    }

    pub fn err(message: impl Into<String>) -> Response {
        Response { response_status: 0, text: None, error: Some(message.into()) }
    }

    /// Serializes as one JSON object followed by the protocol's framing newline.
    pub fn to_framed_line(&self) -> String {
        let mut s = serde_json::to_string(self).expect("Response always serializes");
        s.push('\n');
        s
    }
}
