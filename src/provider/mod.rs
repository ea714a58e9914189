//! Provider abstraction.
//!
//! A provider implements exactly three operations: capture a prepared
//! request, issue one completion, issue one streaming completion. The proxy
//! implementation in [`proxy`] forwards both over HTTP to a remote gateway.

pub mod proxy;

use crate::gen::{Request, Response, StreamResponse};
use crate::prompt::Prompt;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The provider interface.
///
/// `set_request` captures the fully-prepared request; `prompt` and `stream`
/// then run one completion over it plus the given conversation. Streaming
/// channels are terminated by exactly one `eof` event.
#[async_trait]
pub trait Prompter: Send + Sync {
    fn set_request(&self, request: Request);

    async fn prompt(&self, prompts: &[Prompt]) -> crate::Result<Response>;

    async fn stream(&self, prompts: &[Prompt]) -> crate::Result<mpsc::Receiver<StreamResponse>>;
}

/// Network-level failures talking to a provider.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Other(String),
}
