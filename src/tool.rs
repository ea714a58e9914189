//! Tool definitions and the values that flow through tool dispatch.
//!
//! A [`Tool`] is a data record (name, description, schemas, PTC flag) plus an
//! optional async callable. Equality is by name within one request. Three
//! reserved sentinel tools (`none`, `auto`, `required`) carry no function and
//! are only transported as a tool-choice flag.

use crate::schema::Schema;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation handle flowing from the request into tool callbacks.
///
/// Cloning shares the underlying signal; cancelling any clone cancels all.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: tokio::sync::Notify,
}

impl Default for CancelInner {
    fn default() -> Self {
        CancelInner {
            cancelled: AtomicBool::new(false),
            notify: tokio::sync::Notify::new(),
        }
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the handle is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The callable attached to a tool.
///
/// The response string is expected to be valid JSON. Functions must be safe
/// for concurrent invocation: the agent may dispatch several calls at once
/// when running with `parallelism > 1`.
pub type ToolFn =
    Arc<dyn Fn(CancelHandle, ToolCall) -> BoxFuture<'static, crate::Result<String>> + Send + Sync>;

/// A tool the model may call.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Schema>,
    #[serde(default)]
    pub use_ptc: bool,
    #[serde(skip)]
    pub function: Option<ToolFn>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Tool {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn argument_schema(mut self, schema: Schema) -> Self {
        self.argument_schema = Some(schema);
        self
    }

    /// Derive the argument schema from a Rust type.
    pub fn args_of<T: schemars::JsonSchema>(mut self) -> Self {
        self.argument_schema = Some(crate::schema::from_type::<T>());
        self
    }

    pub fn response_schema(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Derive the response schema from a Rust type.
    pub fn response_of<T: schemars::JsonSchema>(mut self) -> Self {
        self.response_schema = Some(crate::schema::from_type::<T>());
        self
    }

    pub fn use_ptc(mut self, use_ptc: bool) -> Self {
        self.use_ptc = use_ptc;
        self
    }

    /// Attach the callable.
    pub fn function<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancelHandle, ToolCall) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = crate::Result<String>> + Send + 'static,
    {
        self.function = Some(Arc::new(move |ctx, call| Box::pin(f(ctx, call))));
        self
    }

    /// The model will not call any tool and generates a message instead.
    pub fn none() -> Tool {
        Tool::new("none")
    }

    /// The model picks between generating a message or calling tools.
    pub fn auto() -> Tool {
        Tool::new("auto")
    }

    /// The model must call one or more tools.
    pub fn required() -> Tool {
        Tool::new("required")
    }

    /// The reserved sentinel tools interpreted as tool-choice flags.
    pub fn control_tools() -> [Tool; 3] {
        [Tool::none(), Tool::auto(), Tool::required()]
    }

    pub fn is_control(&self) -> bool {
        matches!(self.name.as_str(), "none" | "auto" | "required")
    }

    /// The tool name with every character outside `[A-Za-z0-9_-]` replaced by
    /// `_`, as required by strict providers.
    pub fn sanitized_name(&self) -> String {
        sanitize_name(&self.name)
    }
}

/// Replace characters outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// Equality is by name within one request; the callable never participates.
impl PartialEq for Tool {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("argument_schema", &self.argument_schema)
            .field("response_schema", &self.response_schema)
            .field("use_ptc", &self.use_ptc)
            .field("function", &self.function.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A model-emitted tool invocation: id, name and raw JSON argument.
///
/// `reference` is a local back-pointer to the tool definition so the agent can
/// dispatch without a separate lookup; it is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub argument: Value,
    #[serde(skip)]
    pub reference: Option<Tool>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, argument: Value) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            argument,
            reference: None,
        }
    }

    /// Decode the argument into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.argument.clone())?)
    }
}

impl PartialEq for ToolCall {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.argument == other.argument
    }
}

/// The result of running a tool, paired to its call by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub response: String,
}
