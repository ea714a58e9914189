//! Conversation entries.
//!
//! A prompt is a tagged union over the four conversational roles. The wire
//! form is `{ "role": ..., ... }` with role-specific fields, which the serde
//! tag representation produces directly.

use crate::tool::{ToolCall, ToolResponse};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Prompt {
    /// A turn from the caller, optionally carrying a binary payload.
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },
    /// Free-form model reply.
    Assistant { text: String },
    /// A model-emitted tool invocation.
    ToolCall { tool_call: ToolCall },
    /// The result of running a tool, matched to its call by id.
    ToolResponse { tool_response: ToolResponse },
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Prompt::User {
            text: text.into(),
            payload: None,
        }
    }

    pub fn user_with_payload(text: impl Into<String>, payload: Payload) -> Self {
        Prompt::User {
            text: text.into(),
            payload: Some(payload),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Prompt::Assistant { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, argument: Value) -> Self {
        Prompt::ToolCall {
            tool_call: ToolCall::new(id, name, argument),
        }
    }

    pub fn tool_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Prompt::ToolResponse {
            tool_response: ToolResponse {
                id: id.into(),
                name: name.into(),
                response: response.into(),
            },
        }
    }

    /// The role tag as it appears on the wire.
    pub fn role(&self) -> &'static str {
        match self {
            Prompt::User { .. } => "user",
            Prompt::Assistant { .. } => "assistant",
            Prompt::ToolCall { .. } => "tool_call",
            Prompt::ToolResponse { .. } => "tool_response",
        }
    }
}

/// Binary attachment on a user prompt (image, PDF, …), carried either inline
/// as base64 data or as a reference URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Payload {
    /// Inline payload; `bytes` are base64-encoded for transport.
    pub fn from_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        Payload {
            mime: mime.into(),
            data: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            uri: None,
        }
    }

    pub fn from_uri(mime: impl Into<String>, uri: impl Into<String>) -> Self {
        Payload {
            mime: mime.into(),
            data: None,
            uri: Some(uri.into()),
        }
    }

    /// Read a file and attach it inline, guessing the media type from the
    /// extension.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime = guess_media_type(path).unwrap_or("application/octet-stream");
        Ok(Self::from_bytes(mime, &bytes))
    }

    /// Decode the inline data back to raw bytes, if present.
    pub fn bytes(&self) -> crate::Result<Option<Vec<u8>>> {
        match &self.data {
            None => Ok(None),
            Some(data) => base64::engine::general_purpose::STANDARD
                .decode(data)
                .map(Some)
                .map_err(|e| crate::Error::validation(format!("invalid payload base64: {}", e))),
        }
    }
}

fn guess_media_type(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_serialize_with_tag() {
        let user = Prompt::user("hello");
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            json!({"role": "user", "text": "hello"})
        );

        let call = Prompt::tool_call("c1", "get_earnings", json!({"name": "LKAB"}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["role"], "tool_call");
        assert_eq!(value["tool_call"]["name"], "get_earnings");
    }

    #[test]
    fn conversation_round_trips() {
        let conversation = vec![
            Prompt::user_with_payload("what is this?", Payload::from_bytes("image/png", b"\x89PNG")),
            Prompt::tool_call("c1", "lookup", json!({"q": "x"})),
            Prompt::tool_response("c1", "lookup", r#"{"result": 1}"#),
            Prompt::assistant("done"),
        ];
        let encoded = serde_json::to_string(&conversation).unwrap();
        let decoded: Vec<Prompt> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(conversation, decoded);

        match &decoded[0] {
            Prompt::User {
                payload: Some(p), ..
            } => {
                assert_eq!(p.mime, "image/png");
                assert_eq!(p.bytes().unwrap().unwrap(), b"\x89PNG");
            }
            other => panic!("expected user with payload, got {:?}", other),
        }
    }
}
