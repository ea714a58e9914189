//! The vendor-agnostic generation contract: request, response and the
//! copy-on-modify generator builder.

pub mod generator;
pub mod request;
pub mod response;

pub use generator::Generator;
pub use request::{FullRequest, Request};
pub use response::{Response, StreamEventType, StreamResponse};
