//! The agent loop.
//!
//! [`run`] drives a generator through repeated tool-call/tool-response turns
//! until the model answers without tool calls, then decodes that answer into
//! the requested type. [`run_with_tools_only`] is the fallback for providers
//! that cannot enforce structured output and allow tool calls at the same
//! time: it injects a final sentinel tool and treats a call to it as the
//! terminal answer.

use crate::gen::Generator;
use crate::model::Metadata;
use crate::prompt::Prompt;
use crate::tool::{CancelHandle, Tool, ToolCall};
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Name of the sentinel tool injected by [`run_with_tools_only`].
pub const RETURN_RESULT_TOOL: &str = "__return_result_tool__";

/// Outcome of one agent run: the conversation including every
/// tool-call/tool-response pair, the typed result, accumulated usage, and the
/// number of model turns consumed.
#[derive(Debug)]
pub struct AgentResult<T> {
    pub prompts: Vec<Prompt>,
    pub result: T,
    pub metadata: Metadata,
    pub depth: usize,
}

/// Prompt until the model responds with no tool calls, or until `max_depth`
/// is reached.
///
/// Unless an output schema is already set, one is derived from `T` (skipped
/// when `T` is `String`, in which case the response text is taken verbatim).
/// Tool calls are dispatched sequentially when `parallelism <= 1`, otherwise
/// through a semaphore of that capacity; conversation order always follows
/// the order the model emitted the calls.
pub async fn run<T>(
    max_depth: usize,
    parallelism: usize,
    generator: &Generator,
    prompts: Vec<Prompt>,
) -> crate::Result<AgentResult<T>>
where
    T: DeserializeOwned + schemars::JsonSchema + Send + 'static,
{
    let result_is_string = TypeId::of::<T>() == TypeId::of::<String>();
    let generator = if generator.request.output_schema.is_none() && !result_is_string {
        generator.output_of::<T>()
    } else {
        generator.clone()
    };

    let cancel = generator.request.cancel.clone().unwrap_or_default();
    let mut metadata = Metadata {
        model: generator.request.model.name.clone(),
        ..Default::default()
    };
    let mut prompts = prompts;

    for depth in 0..max_depth {
        let response = generator
            .prompt(&prompts)
            .await
            .map_err(|e| e.at_depth(depth))?;
        metadata.absorb(&response.metadata);

        if !response.is_tools() {
            let result: T = if result_is_string {
                let text = response.as_text().map_err(|e| e.at_depth(depth))?;
                into_string_result(text)?
            } else {
                response.unmarshal().map_err(|e| e.at_depth(depth))?
            };
            return Ok(AgentResult {
                prompts,
                result,
                metadata,
                depth,
            });
        }

        let calls = response.as_tools().map_err(|e| e.at_depth(depth))?.to_vec();
        validate_calls(&calls).map_err(|e| e.at_depth(depth))?;

        tracing::debug!(depth, calls = calls.len(), "dispatching tool calls");
        append_outcomes(
            &mut prompts,
            &calls,
            dispatch(&cancel, &calls, parallelism).await,
        )
        .map_err(|e| e.at_depth(depth))?;
    }

    Err(crate::Error::MaxDepth { max_depth })
}

/// Prompt until the model calls the injected `__return_result_tool__`
/// sentinel, whose argument is decoded as the typed result.
///
/// Any previously set output schema is removed and tool choice is forced to
/// `required`, so every turn produces tool calls. Prefer [`run`] on providers
/// that support structured output alongside tools.
pub async fn run_with_tools_only<T>(
    max_depth: usize,
    parallelism: usize,
    generator: &Generator,
    prompts: Vec<Prompt>,
) -> crate::Result<AgentResult<T>>
where
    T: DeserializeOwned + schemars::JsonSchema + Send + 'static,
{
    let mut generator = generator.clone();
    if generator.request.output_schema.is_some() {
        generator = generator.clear_output();
    }

    let kept: Vec<Tool> = generator
        .source_tools()
        .iter()
        .filter(|t| t.name != RETURN_RESULT_TOOL)
        .cloned()
        .collect();
    generator = generator
        .set_tools(kept)
        .add_tools([Tool::new(RETURN_RESULT_TOOL)
            .description("Return the final results to the user")
            .argument_schema(crate::schema::from_type::<T>())])
        .set_tool_config(Tool::required());

    let cancel = generator.request.cancel.clone().unwrap_or_default();
    let mut metadata = Metadata {
        model: generator.request.model.name.clone(),
        ..Default::default()
    };
    let mut prompts = prompts;

    for depth in 0..max_depth {
        let response = generator
            .prompt(&prompts)
            .await
            .map_err(|e| e.at_depth(depth))?;
        metadata.absorb(&response.metadata);

        let calls = response.as_tools().map_err(|e| e.at_depth(depth))?.to_vec();

        // The sentinel carries the final answer; validation is skipped for it.
        for call in &calls {
            if call.name == RETURN_RESULT_TOOL {
                let result: T = call.decode().map_err(|e| e.at_depth(depth))?;
                return Ok(AgentResult {
                    prompts,
                    result,
                    metadata,
                    depth,
                });
            }
        }
        validate_calls(&calls).map_err(|e| e.at_depth(depth))?;

        append_outcomes(
            &mut prompts,
            &calls,
            dispatch(&cancel, &calls, parallelism).await,
        )
        .map_err(|e| e.at_depth(depth))?;
    }

    Err(crate::Error::MaxDepth { max_depth })
}

fn into_string_result<T: 'static>(text: String) -> crate::Result<T> {
    let boxed: Box<dyn Any> = Box::new(text);
    boxed
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| crate::Error::runtime("string result does not match the requested type"))
}

// Every referenced tool must exist and carry a function before anything runs.
fn validate_calls(calls: &[ToolCall]) -> crate::Result<()> {
    for call in calls {
        let reference = call.reference.as_ref().ok_or_else(|| crate::Error::ToolDispatch {
            tool: call.name.clone(),
            reason: "not found in local setup".to_string(),
        })?;
        if reference.function.is_none() {
            return Err(crate::Error::ToolDispatch {
                tool: call.name.clone(),
                reason: "no callback function attached".to_string(),
            });
        }
    }
    Ok(())
}

struct CallOutcome {
    index: usize,
    id: String,
    name: String,
    result: crate::Result<String>,
}

async fn dispatch(
    cancel: &CancelHandle,
    calls: &[ToolCall],
    parallelism: usize,
) -> Vec<CallOutcome> {
    if parallelism <= 1 {
        let mut outcomes = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            outcomes.push(execute_call(cancel.clone(), index, call.clone()).await);
        }
        return outcomes;
    }

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let futures = calls.iter().enumerate().map(|(index, call)| {
        let cancel = cancel.clone();
        let call = call.clone();
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.ok();
            execute_call(cancel, index, call).await
        }
    });
    // join_all returns results in input order regardless of completion order.
    futures::future::join_all(futures).await
}

async fn execute_call(cancel: CancelHandle, index: usize, call: ToolCall) -> CallOutcome {
    let id = call.id.clone();
    let name = call.name.clone();
    let function = call.reference.as_ref().and_then(|t| t.function.clone());

    let result = match function {
        Some(function) => function(cancel, call).await,
        None => Err(crate::Error::ToolDispatch {
            tool: name.clone(),
            reason: "no callback function attached".to_string(),
        }),
    };

    CallOutcome {
        index,
        id,
        name,
        result,
    }
}

// Append (tool-call, tool-response) pairs in emitted order. A failed call is
// terminal after its tool-call prompt is recorded.
fn append_outcomes(
    prompts: &mut Vec<Prompt>,
    calls: &[ToolCall],
    outcomes: Vec<CallOutcome>,
) -> crate::Result<()> {
    for outcome in outcomes {
        let call = &calls[outcome.index];
        prompts.push(Prompt::tool_call(
            call.id.clone(),
            call.name.clone(),
            call.argument.clone(),
        ));

        match outcome.result {
            Ok(response) => {
                prompts.push(Prompt::tool_response(outcome.id, outcome.name, response));
            }
            Err(e) => {
                return Err(crate::Error::Tool {
                    tool: outcome.name,
                    message: e.to_string(),
                    argument: call.argument.to_string(),
                })
            }
        }
    }
    Ok(())
}
