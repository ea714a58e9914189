//! Shared fixtures: a scripted in-memory prompter and a deterministic set of
//! PTC tools.

#![allow(dead_code)]

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use skald::gen::{Request, Response, StreamResponse};
use skald::provider::Prompter;
use skald::{Generator, Metadata, Model, Prompt, Tool, ToolCall};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A prompter that replays canned responses in order, re-wiring tool
/// references from the captured request exactly like a real provider.
pub struct ScriptedPrompter {
    request: Mutex<Request>,
    turns: Mutex<VecDeque<Response>>,
}

impl ScriptedPrompter {
    pub fn new(turns: Vec<Response>) -> Arc<Self> {
        Arc::new(ScriptedPrompter {
            request: Mutex::new(Request::default()),
            turns: Mutex::new(turns.into()),
        })
    }

    /// The most recently captured request.
    pub fn captured(&self) -> Request {
        self.request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    fn set_request(&self, request: Request) {
        *self.request.lock().unwrap() = request;
    }

    async fn prompt(&self, _prompts: &[Prompt]) -> skald::Result<Response> {
        let request = self.captured();
        let mut response = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| skald::Error::provider("scripted prompter exhausted"))?;
        response.attach_tool_refs(&request.tools);
        Ok(response)
    }

    async fn stream(&self, _prompts: &[Prompt]) -> skald::Result<mpsc::Receiver<StreamResponse>> {
        Err(skald::Error::provider("streaming is not scripted"))
    }
}

pub fn generator_for(prompter: Arc<ScriptedPrompter>) -> Generator {
    Generator::new(prompter).model(Model::new("OpenAI", "gpt-4o-mini"))
}

pub fn text_response(text: &str) -> Response {
    Response {
        texts: vec![text.to_string()],
        metadata: Metadata {
            model: "gpt-4o-mini".into(),
            input_tokens: 10,
            output_tokens: 5,
            thinking_tokens: 0,
            total_tokens: 15,
        },
        ..Default::default()
    }
}

pub fn tool_call_response(calls: &[(&str, &str, Value)]) -> Response {
    Response {
        tools: calls
            .iter()
            .map(|(id, name, argument)| ToolCall::new(*id, *name, argument.clone()))
            .collect(),
        metadata: Metadata {
            model: "gpt-4o-mini".into(),
            input_tokens: 10,
            output_tokens: 5,
            thinking_tokens: 0,
            total_tokens: 15,
        },
        ..Default::default()
    }
}

/// Every tool-call prompt must be followed by its matching tool-response.
pub fn assert_call_response_pairing(prompts: &[Prompt]) {
    for (i, prompt) in prompts.iter().enumerate() {
        if let Prompt::ToolCall { tool_call } = prompt {
            match prompts.get(i + 1) {
                Some(Prompt::ToolResponse { tool_response }) => {
                    assert_eq!(tool_response.id, tool_call.id, "ids must pair");
                    assert_eq!(tool_response.name, tool_call.name, "names must pair");
                }
                other => panic!(
                    "tool call {} not followed by its response, got {:?}",
                    tool_call.id, other
                ),
            }
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct FutureArgs {
    pub question: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct CurrencyArgs {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct PasswordArgs {
    pub length: usize,
    pub special: bool,
}

/// Three deterministic PTC tools mirroring a small financial-assistant setup.
pub fn mock_ptc_tools() -> Vec<Tool> {
    let predict = Tool::new("predict_future")
        .description("Returns a mystical answer to a yes/no question.")
        .args_of::<FutureArgs>()
        .use_ptc(true)
        .function(|_ctx, call| async move {
            let _args: FutureArgs = call.decode()?;
            Ok("The stars say yes.".to_string())
        });

    let convert = Tool::new("convert_currency")
        .description("Converts currency amounts (USD, EUR, SEK, GBP, JPY).")
        .args_of::<CurrencyArgs>()
        .use_ptc(true)
        .function(|_ctx, call| async move {
            let args: CurrencyArgs = call.decode()?;
            let rate = |code: &str| match code.to_uppercase().as_str() {
                "USD" => Some(1.0),
                "EUR" => Some(0.92),
                "SEK" => Some(10.50),
                "GBP" => Some(0.79),
                "JPY" => Some(148.0),
                _ => None,
            };
            match (rate(&args.from), rate(&args.to)) {
                (Some(from), Some(to)) => Ok(format!("{:.2}", args.amount / from * to)),
                _ => Ok(format!(
                    "Error: Unknown currency pair {} -> {}",
                    args.from, args.to
                )),
            }
        });

    let password = Tool::new("generate_password")
        .description("Generates a random string. 'special' adds symbols.")
        .args_of::<PasswordArgs>()
        .use_ptc(true)
        .function(|_ctx, call| async move {
            let args: PasswordArgs = call.decode()?;
            if args.length > 50 {
                return Ok("Error: Password too long!".to_string());
            }
            let mut chars: Vec<char> =
                "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"
                    .chars()
                    .collect();
            if args.special {
                chars.extend("!@#$%^&*()_+".chars());
            }
            Ok((0..args.length).map(|i| chars[(i * 7) % chars.len()]).collect())
        });

    vec![predict, convert, password]
}

/// A non-PTC earnings tool for the plain tool-calling scenarios.
pub fn earnings_tool() -> Tool {
    #[derive(Deserialize, JsonSchema)]
    struct EarningsArgs {
        name: String,
    }

    Tool::new("get_earnings")
        .description("Yearly earnings for a company, in SEK.")
        .args_of::<EarningsArgs>()
        .function(|_ctx, call| async move {
            let args: EarningsArgs = call.decode()?;
            match args.name.as_str() {
                "LKAB" => Ok(json!({"result": 6969696969_i64}).to_string()),
                _ => Ok(json!({"result": 0}).to_string()),
            }
        })
}
