//! Proxy provider: forwards generation requests to a remote gateway over
//! HTTP.
//!
//! The full request (including the conversation) is serialized to JSON and
//! posted to `/gen`, or `/gen/stream` for Server-Sent Events. Decoded tool
//! calls get their local back-pointer re-wired so the agent can dispatch
//! without a separate lookup.

use crate::gen::{FullRequest, Generator, Request, Response, StreamEventType, StreamResponse};
use crate::model::Model;
use crate::prompt::Prompt;
use crate::provider::{Prompter, TransportError};
use crate::tool::{CancelHandle, Tool};
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Provider name of the proxy gateway.
pub const PROVIDER: &str = "Skald";

/// Named API key; sent as `name_token` in the bearer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub token: String,
}

impl Key {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Key {
            name: name.into(),
            token: token.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.token)
    }
}

/// Client for the proxy gateway.
pub struct Client {
    url: String,
    key: Key,
    http: reqwest::Client,
    stream_http: reqwest::Client,
}

impl Client {
    /// Connect to a gateway. The request timeout defaults to 300 seconds and
    /// can be overridden with `SKALD_HTTP_TIMEOUT_SECS`; streaming requests
    /// carry no timeout and rely on cancellation instead.
    pub fn new(url: impl Into<String>, key: Key) -> crate::Result<Self> {
        let timeout_secs = std::env::var("SKALD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(300);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(TransportError::Http)?;
        let stream_http = reqwest::Client::builder()
            .build()
            .map_err(TransportError::Http)?;

        Ok(Client {
            url: url.into().trim_end_matches('/').to_string(),
            key,
            http,
            stream_http,
        })
    }

    /// A fresh generator wired to this gateway.
    pub fn generator(&self) -> Generator {
        Generator::new(Arc::new(ProxyPrompter {
            url: self.url.clone(),
            key: self.key.clone(),
            http: self.http.clone(),
            stream_http: self.stream_http.clone(),
            request: StdMutex::new(Request::default()),
        }))
    }

    /// List the generation models the gateway serves.
    pub async fn models(&self) -> crate::Result<Vec<Model>> {
        let url = format!("{}/gen/models", self.url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.key.to_string())
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(TransportError::Http)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        serde_json::from_str(&body)
            .map_err(|e| crate::Error::provider(format!("could not decode model list: {}", e)))
    }
}

struct ProxyPrompter {
    url: String,
    key: Key,
    http: reqwest::Client,
    stream_http: reqwest::Client,
    request: StdMutex<Request>,
}

impl ProxyPrompter {
    fn captured_request(&self) -> crate::Result<Request> {
        self.request
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| crate::Error::runtime("request lock poisoned"))
    }
}

#[async_trait]
impl Prompter for ProxyPrompter {
    fn set_request(&self, request: Request) {
        if let Ok(mut guard) = self.request.lock() {
            *guard = request;
        }
    }

    async fn prompt(&self, prompts: &[Prompt]) -> crate::Result<Response> {
        let request = self.captured_request()?;
        request.validate()?;

        let request_id = Uuid::new_v4();
        let cancel = request.cancel.clone();
        let full = FullRequest::new(request, prompts.to_vec());

        tracing::debug!(
            request = %request_id,
            model = %full.request.model.fqn(),
            tools = full.request.tools.len(),
            output_schema = full.request.output_schema.is_some(),
            "generation request"
        );

        let send = self
            .http
            .post(format!("{}/gen", self.url))
            .json(&full)
            .bearer_auth(self.key.to_string())
            .header("x-request-id", request_id.to_string())
            .send();

        let response = match &cancel {
            Some(cancel) => tokio::select! {
                result = send => result,
                _ = cancel.cancelled() => return Err(crate::Error::runtime("request cancelled")),
            },
            None => send.await,
        }
        .map_err(TransportError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(TransportError::Http)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let mut decoded: Response = serde_json::from_str(&body).map_err(|e| {
            tracing::debug!(request = %request_id, error = %e, "could not decode response");
            crate::Error::provider(format!("could not decode generation response: {}", e))
        })?;
        decoded.attach_tool_refs(&full.request.tools);

        tracing::debug!(
            request = %request_id,
            input_tokens = decoded.metadata.input_tokens,
            output_tokens = decoded.metadata.output_tokens,
            total_tokens = decoded.metadata.total_tokens,
            "generation response"
        );

        Ok(decoded)
    }

    async fn stream(&self, prompts: &[Prompt]) -> crate::Result<mpsc::Receiver<StreamResponse>> {
        let mut request = self.captured_request()?;
        request.stream = true;
        request.validate()?;
        if prompts.is_empty() {
            return Err(crate::Error::validation(
                "at least one prompt is required for a streaming request",
            ));
        }

        let request_id = Uuid::new_v4();
        let cancel = request.cancel.clone();
        let full = FullRequest::new(request, prompts.to_vec());
        let tools = full.request.tools.clone();

        tracing::debug!(
            request = %request_id,
            model = %full.request.model.fqn(),
            "stream request"
        );

        let response = self
            .stream_http
            .post(format!("{}/gen/stream", self.url))
            .json(&full)
            .bearer_auth(self.key.to_string())
            .header("accept", "text/event-stream")
            .header("cache-control", "no-cache")
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(pump_sse(response, tools, cancel, tx));
        Ok(rx)
    }
}

// Incrementally buffer the SSE body and forward one event per `data: ` line.
// The channel is terminated by exactly one eof event, whether the server sent
// its own eof, a `[DONE]` marker, both, or neither.
async fn pump_sse(
    response: reqwest::Response,
    tools: Vec<Tool>,
    cancel: Option<CancelHandle>,
    tx: mpsc::Sender<StreamResponse>,
) {
    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut sent_eof = false;

    'read: loop {
        let chunk = match &cancel {
            Some(cancel) => tokio::select! {
                chunk = byte_stream.next() => chunk,
                _ = cancel.cancelled() => {
                    let _ = tx.send(StreamResponse::error("stream cancelled")).await;
                    break 'read;
                }
            },
            None => byte_stream.next().await,
        };

        match chunk {
            Some(Ok(bytes)) => {
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);
                    if forward_line(&line, &tools, &tx, &mut sent_eof)
                        .await
                        .is_break()
                    {
                        break 'read;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(StreamResponse::error(format!("error reading stream: {}", e)))
                    .await;
                break;
            }
            None => {
                let rest = buffer.trim().to_string();
                if !rest.is_empty() {
                    let _ = forward_line(&rest, &tools, &tx, &mut sent_eof).await;
                }
                break;
            }
        }
    }

    if !sent_eof {
        let _ = tx.send(StreamResponse::eof()).await;
    }
}

async fn forward_line(
    line: &str,
    tools: &[Tool],
    tx: &mpsc::Sender<StreamResponse>,
    sent_eof: &mut bool,
) -> ControlFlow<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return ControlFlow::Continue(());
    }

    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => {
            let _ = tx
                .send(StreamResponse::error("expected 'data' header from sse"))
                .await;
            return ControlFlow::Break(());
        }
    };

    if payload == "[DONE]" {
        return ControlFlow::Break(());
    }

    match serde_json::from_str::<StreamResponse>(payload) {
        Ok(mut event) => {
            if let Some(call) = &mut event.tool_call {
                if call.reference.is_none() {
                    call.reference = tools.iter().find(|t| t.name == call.name).cloned();
                }
            }
            let is_eof = event.event_type == StreamEventType::Eof;
            if tx.send(event).await.is_err() {
                return ControlFlow::Break(());
            }
            if is_eof {
                *sent_eof = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        Err(e) => {
            let _ = tx
                .send(StreamResponse::error(format!(
                    "could not decode stream chunk: {}",
                    e
                )))
                .await;
            ControlFlow::Break(())
        }
    }
}
