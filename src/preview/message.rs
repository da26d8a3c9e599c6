//! Cross-context message shape posted by the sandboxed document.

use serde::{Deserialize, Serialize};

pub const IFRAME_ERROR_TYPE: &str = "PRISM_IFRAME_ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
}

impl FrameMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: IFRAME_ERROR_TYPE.to_string(), error: text.into() }
    }
}

/// Error text of a well-formed error message; `None` for anything else.
pub fn parse_error(raw: &str) -> Option<String> {
    let msg: FrameMessage = serde_json::from_str(raw).ok()?;
    (msg.kind == IFRAME_ERROR_TYPE).then_some(msg.error)
}
