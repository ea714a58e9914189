//! Unified error type and structured error context.
//!
//! The design principle follows the runtime's error taxonomy: validation,
//! transport, provider-payload, tool-dispatch and depth-exhaustion failures
//! are terminal and surface to the caller; script-side failures never appear
//! here because they are fed back to the model as structured tool responses.

use crate::provider::TransportError;
use thiserror::Error;

/// Structured context attached to validation, configuration and runtime
/// errors. Kept small on purpose: a field for where, a field for what, and an
/// actionable hint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Additional detail about the failure (expected vs. actual, offending value).
    pub details: Option<String>,
    /// Component that raised the error (e.g. "ptc_adapter", "proxy_provider").
    pub source: Option<String>,
    /// Actionable suggestion for the caller.
    pub hint: Option<String>,
    /// HTTP status code, when the error crossed the wire.
    pub status_code: Option<u16>,
    /// Whether retrying the same call can reasonably succeed.
    pub retryable: Option<bool>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(code) = ctx.status_code {
        parts.push(format!("status: {}", code));
    }
    if let Some(retryable) = ctx.retryable {
        parts.push(format!("retryable: {}", retryable));
    }

    let ctx_str = if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(", "))
    };

    match ctx.hint {
        Some(ref hint) => format!("{} (hint: {})", ctx_str, hint),
        None => ctx_str,
    }
}

/// Unified error type for the runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    /// Network-level failure talking to a provider.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A provider answered with a payload the runtime cannot make sense of.
    #[error("provider payload error: {message}")]
    Provider { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A tool call referenced a tool the agent cannot dispatch.
    #[error("tool {tool} cannot be dispatched: {reason}")]
    ToolDispatch { tool: String, reason: String },

    /// A tool function returned an error; terminal for the agent loop.
    #[error("tool {tool} failed: {message}, arg: {argument}")]
    Tool {
        tool: String,
        message: String,
        argument: String,
    },

    /// Any terminal agent failure, tagged with the depth at which it occurred.
    #[error("agent error at depth {depth}: {source}")]
    Agent {
        depth: usize,
        #[source]
        source: Box<Error>,
    },

    /// The agent exhausted its turn budget without a terminal response.
    #[error("max depth {max_depth} reached")]
    MaxDepth { max_depth: usize },
}

impl Error {
    /// Create a simple validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a simple configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a simple runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::Runtime {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a provider payload error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider {
            message: msg.into(),
        }
    }

    /// Tag a terminal error with the agent depth at which it occurred.
    pub fn at_depth(self, depth: usize) -> Self {
        Error::Agent {
            depth,
            source: Box::new(self),
        }
    }

    /// Extract error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}
