//! The request half of the generation contract.

use crate::model::Model;
use crate::prompt::Prompt;
use crate::ptc::ProgramLanguage;
use crate::schema::Schema;
use crate::tool::{CancelHandle, Tool};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A fully-specified generation request, minus the conversation.
///
/// Cloning is a deep copy of everything the builder can touch; the
/// cancellation handle is shared by reference, like the context it stands for.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Request {
    #[serde(skip)]
    pub cancel: Option<CancelHandle>,

    #[serde(default)]
    pub stream: bool,

    pub model: Model,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Schema>,
    #[serde(rename = "output_strict", default, skip_serializing_if = "std::ops::Not::not")]
    pub strict_output: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(rename = "tool", default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<Tool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_parts: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Target language for programmatic tool-calling.
    #[serde(skip)]
    pub ptc_language: ProgramLanguage,
    /// System-prompt fragment produced by the PTC adapter; folded into the
    /// system prompt when the request goes on the wire.
    #[serde(skip)]
    pub ptc_system_fragment: String,
}

impl Request {
    /// Check the invariants a provider relies on.
    pub fn validate(&self) -> crate::Result<()> {
        if self.model.name.is_empty() {
            return Err(crate::Error::validation("a model is required"));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(crate::Error::validation(format!(
                    "duplicate tool name {:?} in request",
                    tool.name
                )));
            }
        }

        if let Some(choice) = &self.tool_config {
            if !choice.is_control() && !self.tools.iter().any(|t| t.name == choice.name) {
                return Err(crate::Error::validation(format!(
                    "specified tool {:?} not found in available tools",
                    choice.name
                )));
            }
        }

        Ok(())
    }

    /// The system prompt as the model should see it, with the PTC fragment
    /// appended when present.
    pub fn effective_system_prompt(&self) -> Option<String> {
        if self.ptc_system_fragment.is_empty() {
            return self.system_prompt.clone();
        }
        let base = self.system_prompt.clone().unwrap_or_default();
        Some(format!("{}{}", base, self.ptc_system_fragment))
    }
}

/// A request together with the conversation, as posted to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullRequest {
    #[serde(flatten)]
    pub request: Request,
    pub prompts: Vec<Prompt>,
}

impl FullRequest {
    /// Assemble the wire form: the PTC system fragment is folded into the
    /// system prompt so providers never see it as a separate field.
    pub fn new(mut request: Request, prompts: Vec<Prompt>) -> Self {
        request.system_prompt = request.effective_system_prompt();
        request.ptc_system_fragment = String::new();
        FullRequest { request, prompts }
    }
}
