//! Wire framing: newline-delimited JSON over stdio
//!
//! Each frame is `{id, kind, name, payload}`. Responses echo the request
//! id; errors carry `{code, message, hint?}` in the payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use genome_core::{GenomeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Request,
    Response,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Client-chosen correlation id, echoed back verbatim.
    pub id: Value,
    pub kind: FrameKind,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn parse(line: &str) -> Result<Frame> {
        let frame: Frame = serde_json::from_str(line)
            .map_err(|e| GenomeError::invalid_input(format!("malformed frame: {e}")))?;
        if frame.kind != FrameKind::Request {
            return Err(GenomeError::invalid_input("only request frames are accepted"));
        }
        Ok(frame)
    }

    pub fn response(id: Value, name: &str, payload: Value) -> Frame {
        Frame {
            id,
            kind: FrameKind::Response,
            name: name.to_string(),
            payload,
        }
    }

    pub fn error(id: Value, name: &str, error: &GenomeError) -> Frame {
        let mut payload = json!({
            "code": error.code(),
            "message": error.to_string(),
        });
        if let Some(hint) = error.hint() {
            payload["hint"] = Value::String(hint.to_string());
        }
        if let GenomeError::ContractViolation { code, .. } = error {
            payload["violation"] = Value::String(code.clone());
        }
        Frame {
            id,
            kind: FrameKind::Error,
            name: name.to_string(),
            payload,
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"id\":null,\"kind\":\"error\",\"name\":\"encode\",\"payload\":{}}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_frames() {
        let frame =
            Frame::parse("{\"id\": 1, \"kind\": \"request\", \"name\": \"stats\", \"payload\": {}}")
                .unwrap();
        assert_eq!(frame.name, "stats");
        assert_eq!(frame.id, json!(1));
    }

    #[test]
    fn rejects_non_request_frames() {
        let result =
            Frame::parse("{\"id\": 1, \"kind\": \"response\", \"name\": \"stats\", \"payload\": {}}");
        assert!(matches!(result, Err(GenomeError::InvalidInput { .. })));
    }

    #[test]
    fn error_frames_carry_code_and_hint() {
        let err = GenomeError::contract("missing-load", "load the genome first");
        let frame = Frame::error(json!(7), "update", &err);
        assert_eq!(frame.kind, FrameKind::Error);
        assert_eq!(frame.payload["code"], "contract-violation");
        assert_eq!(frame.payload["violation"], "missing-load");
        assert!(frame.payload["hint"].is_string());
        // Round-trips through a line.
        let line = frame.to_line();
        assert!(line.ends_with('}'));
    }
}
