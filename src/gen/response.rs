//! The response half of the generation contract, plus streaming events.

use crate::model::Metadata;
use crate::tool::{Tool, ToolCall};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One completion from a provider. Exactly one of `texts` or `tools` is
/// meaningful; use [`Response::is_text`] / [`Response::is_tools`] to
/// disambiguate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCall>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Response {
    pub fn is_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn is_text(&self) -> bool {
        !self.texts.is_empty() && !self.is_tools()
    }

    /// The first text part.
    pub fn as_text(&self) -> crate::Result<String> {
        self.texts
            .first()
            .cloned()
            .ok_or_else(|| crate::Error::provider("response contains no text parts"))
    }

    /// The emitted tool calls, in model order.
    pub fn as_tools(&self) -> crate::Result<&[ToolCall]> {
        if self.tools.is_empty() {
            return Err(crate::Error::provider("response contains no tool calls"));
        }
        Ok(&self.tools)
    }

    /// Decode the first text part as JSON into a typed value.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let text = self.as_text()?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Re-wire the local back-pointer on each tool call so the agent can
    /// dispatch without a separate lookup.
    pub fn attach_tool_refs(&mut self, tools: &[Tool]) {
        for call in &mut self.tools {
            call.reference = tools.iter().find(|t| t.name == call.name).cloned();
        }
    }
}

/// Event tag of a streaming response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    Delta,
    ThinkingDelta,
    Metadata,
    Error,
    Eof,
}

/// One streaming event. `eof` terminates the stream exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResponse {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl StreamResponse {
    pub fn eof() -> Self {
        StreamResponse {
            event_type: StreamEventType::Eof,
            role: None,
            index: None,
            content: None,
            tool_call: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamResponse {
            event_type: StreamEventType::Error,
            content: Some(message.into()),
            ..Self::eof()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_and_tools_are_mutually_exclusive() {
        let text = Response {
            texts: vec!["hello".into()],
            ..Default::default()
        };
        assert!(text.is_text());
        assert!(!text.is_tools());

        let tools = Response {
            tools: vec![ToolCall::new("c1", "a", json!({}))],
            ..Default::default()
        };
        assert!(tools.is_tools());
        assert!(!tools.is_text());
    }

    #[test]
    fn unmarshal_decodes_first_text() {
        #[derive(serde::Deserialize)]
        struct Answer {
            text: String,
        }
        let response = Response {
            texts: vec![r#"{"text": "ok"}"#.into()],
            ..Default::default()
        };
        let answer: Answer = response.unmarshal().unwrap();
        assert_eq!(answer.text, "ok");
    }

    #[test]
    fn refs_are_attached_by_name() {
        let mut response = Response {
            tools: vec![ToolCall::new("c1", "a", json!({})), ToolCall::new("c2", "b", json!({}))],
            ..Default::default()
        };
        response.attach_tool_refs(&[Tool::new("a")]);
        assert!(response.tools[0].reference.is_some());
        assert!(response.tools[1].reference.is_none());
    }

    #[test]
    fn stream_event_tags_match_the_wire() {
        let event: StreamResponse =
            serde_json::from_value(json!({"type": "delta", "content": "hi", "index": 0})).unwrap();
        assert_eq!(event.event_type, StreamEventType::Delta);
        assert_eq!(event.content.as_deref(), Some("hi"));

        let eof = serde_json::to_value(StreamResponse::eof()).unwrap();
        assert_eq!(eof, json!({"type": "eof"}));
    }
}
