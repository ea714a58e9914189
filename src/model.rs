//! Model identifiers and usage metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A model identifier: provider, model name and an open map of
/// provider-specific overrides (region, project, …).
///
/// The canonical textual form is `Provider/Name`; `Provider.Name` is accepted
/// on parse. Provider names are case-sensitive on the wire, but common
/// lowercase spellings are canonicalized to the known vendors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Model {
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

impl Model {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Model {
            provider: provider.into(),
            name: name.into(),
            config: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Fully qualified name, `Provider/Name`.
    pub fn fqn(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }

    /// Parse `Provider/Name` (or the `Provider.Name` alternate form).
    pub fn parse(s: &str) -> crate::Result<Model> {
        let (provider, name) = s
            .split_once('/')
            .or_else(|| s.split_once('.'))
            .ok_or_else(|| {
                crate::Error::validation(format!(
                    "model identifier {:?} is not of the form Provider/Name",
                    s
                ))
            })?;
        if provider.is_empty() || name.is_empty() {
            return Err(crate::Error::validation(format!(
                "model identifier {:?} has an empty provider or name",
                s
            )));
        }
        Ok(Model::new(canonical_provider(provider), name))
    }
}

// Lowercase spellings of known vendors are folded to their wire form.
fn canonical_provider(provider: &str) -> String {
    match provider {
        "openai" => "OpenAI".to_string(),
        "anthropic" => "Anthropic".to_string(),
        "vertexai" | "google" => "VertexAI".to_string(),
        "skald" => crate::provider::proxy::PROVIDER.to_string(),
        other => other.to_string(),
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

impl FromStr for Model {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::parse(s)
    }
}

/// Token accounting reported by a provider, accumulated across agent turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub thinking_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Metadata {
    /// Fold another usage report into this one. The model name is kept from
    /// the receiver unless it is still unset.
    pub fn absorb(&mut self, other: &Metadata) {
        if self.model.is_empty() {
            self.model = other.model.clone();
        }
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.thinking_tokens += other.thinking_tokens;
        self.total_tokens += other.total_tokens;
    }
}
