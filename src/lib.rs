//! # skald
//!
//! A provider-agnostic runtime for driving large language models through
//! multi-step, tool-augmented conversations.
//!
//! The centerpiece is Programmatic Tool-Calling (PTC): instead of exposing
//! every tool as its own function-call slot, a set of tools is collapsed into
//! a single synthetic `code_execution` tool whose argument is a short
//! JavaScript program. The model writes one script per turn that calls several
//! tools, combines their results, and returns a value; an embedded sandboxed
//! interpreter executes the script and hands the final expression back as the
//! tool result.
//!
//! The crate is organized around a small set of building blocks:
//!
//! - [`schema`]: a JSON-schema-like tree describing tool arguments, tool
//!   responses and structured outputs, derivable from Rust types.
//! - [`tool`]: tool definitions bundling a schema with an async callable.
//! - [`prompt`]: tagged conversation entries.
//! - [`gen`]: the vendor-agnostic request/response contract and the
//!   copy-on-modify [`Generator`](gen::Generator) builder.
//! - [`ptc`]: the PTC adapter and the sandboxed script session.
//! - [`agent`]: the loop that drives a generator until a typed result falls
//!   out.
//! - [`provider`]: the provider abstraction and the HTTP proxy
//!   implementation.

pub mod agent;
pub mod error;
pub mod gen;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod ptc;
pub mod schema;
pub mod tool;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

pub use agent::AgentResult;
pub use error::{Error, ErrorContext};
pub use gen::{Generator, Request, Response, StreamResponse};
pub use model::{Metadata, Model};
pub use prompt::{Payload, Prompt};
pub use provider::proxy::{Client, Key};
pub use provider::Prompter;
pub use schema::{Schema, SchemaType};
pub use tool::{CancelHandle, Tool, ToolCall, ToolResponse};
