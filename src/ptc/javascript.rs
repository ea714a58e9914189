//! JavaScript PTC adapter.
//!
//! Binds every PTC tool into the script session as `toolName(args)`, renders
//! a typed signature block for the system prompt, and produces the synthetic
//! `code_execution` tool whose executor parses the script argument, applies
//! the guardrails, runs the script under the session lock and interrupt
//! timer, and serializes the final expression back as the tool response.

use crate::ptc::session::{EvalOutcome, HostFn, Session};
use crate::ptc::Runtime;
use crate::schema::{Schema, SchemaType};
use crate::tool::{CancelHandle, Tool, ToolCall};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Name of the synthetic tool standing in for all PTC tools.
pub const CODE_EXECUTION_TOOL: &str = "code_execution";

const TOOL_PREAMBLE: &str = r#"Execute top-level JavaScript in a persistent sandboxed runtime to call available Tool Functions.

Use this tool ONLY when external Tool Functions are required to fetch or interact with data.
The user CANNOT see this tool's output: you must respond to them in normal text output.

DEFAULT USAGE (REQUIRED): Write ONE complete batch script that performs all needed Function calls. Do NOT call Tool Functions one-by-one across turns.

REPL is allowed ONLY if:
- A Function returns /* Unknown Schema */
AND
- Another Function strictly requires a specific field from that result.

RULES:
- At most ONE script per turn.
- Never call the same Function twice with identical arguments.
- Variables persist. Use 'var' or reassign (do not redeclare let/const).
- The LAST evaluated expression is returned automatically. NEVER use 'return;' or a variable assignment on the last line. End with an object, e.g. '({a, b});'.
- Synchronous only. No async/await or external APIs.

Available JavaScript Tool Functions inside the runtime:"#;

const SYSTEM_FRAGMENT: &str = r#"You are an LLM-based AI agent enhanced with Programmatic Tool-Calling (PTC).
The PTC tool at your disposal is the 'code_execution' tool; use it to interact with data.

Tool calls can be costly. Use them only when necessary to fetch or interact with data, and write compact code.

# JavaScript Runtime - Accessible through the 'code_execution' Tool

- Write standard top-level JavaScript. Synchronous only: no async/await, and no logging.
- At most ONE script per turn. Batch all independent Function calls into that script.
- Variables persist across turns. Use 'var' or reassign (do not redeclare let/const).
- The LAST evaluated expression is returned automatically. A variable assignment on the last line evaluates to null; end the script with an object, e.g. '({a, b});'.
- Tool Functions are deterministic. NEVER call a Function twice with identical arguments. Read your history.

## When To Use This Tool
Use 'code_execution' ONLY if external Tool Functions are required.
If the request can be answered with reasoning or general knowledge, respond to the user directly in plain text and do NOT call the tool.

## The ONLY Exception: REPL Yielding
Yield control (STOP after one script) IF AND ONLY IF:
1) Function A returns /* Unknown Schema */, AND
2) Another Function B strictly requires a specific field from A's result.
Execute Function A, put its result on the last line, and STOP. Do NOT guess property names.

## Finishing the Task (CRITICAL)
This tool ONLY fetches and interacts with data. The user CANNOT see its output.
When you have the final answer, you MUST STOP using 'code_execution' and write a normal, plain-text response to the user.
"#;

/// Adapt the PTC tool set into `(code_execution tool, system fragment)`,
/// binding each tool into the session owned by `runtime`.
///
/// Re-invocation rebinds: a binding with the same name overwrites the
/// previous one.
pub(crate) fn adapt_tools(runtime: &Runtime, input_tools: &[Tool]) -> crate::Result<(Tool, String)> {
    let session = runtime.ensure_session()?;
    let handle = Handle::try_current().map_err(|_| {
        crate::Error::configuration_with_context(
            "PTC tools require a tokio runtime context",
            crate::ErrorContext::new()
                .with_source("ptc_adapter")
                .with_hint("attach tools from within the async runtime"),
        )
    })?;

    let mut descriptions = Vec::with_capacity(input_tools.len());
    for tool in input_tools {
        bind_tool(&session, tool, &handle)?;
        descriptions.push(format_tool_signature(tool));
    }
    let docs_fragment = descriptions.join("\n\n");

    let executor_session = session.clone();
    let ptc_tool = Tool::new(CODE_EXECUTION_TOOL)
        .description(format!("{}\n\n{}", TOOL_PREAMBLE, docs_fragment))
        .argument_schema(Schema::object().required_property(
            "code",
            Schema::string().description("The executable top-level JavaScript code string."),
        ))
        .function(move |cancel, call| {
            let session = executor_session.clone();
            async move { execute(session, cancel, call).await }
        });

    let system_fragment = format!(
        "\n\n{}\n## Available JavaScript Tool Functions inside the runtime:\n\n{}",
        SYSTEM_FRAGMENT, docs_fragment
    );

    Ok((ptc_tool, system_fragment))
}

async fn execute(
    session: Arc<Session>,
    cancel: CancelHandle,
    call: ToolCall,
) -> crate::Result<String> {
    #[derive(Deserialize)]
    struct CodeArgs {
        code: String,
    }

    let args: CodeArgs = call.decode()?;

    if let Err(message) = guardrail_js(&args.code) {
        tracing::warn!(reason = %message, "blocked script before execution");
        return Ok(json!({ "error": message }).to_string());
    }

    match session.eval(&args.code, &cancel).await? {
        EvalOutcome::Value(value) => Ok(value),
        EvalOutcome::ScriptError(message) => Ok(json!({ "error": message }).to_string()),
    }
}

/// Static filter applied to model-produced scripts before execution.
///
/// Failures are returned to the model as structured tool responses so it can
/// rewrite the script; they never terminate the agent loop.
pub fn guardrail_js(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("RuntimeError: No code script provided. Rewrite the code immediately.".into());
    }

    // The last-expression-is-the-result convention makes logging ambiguous.
    if code.contains("print( ") || code.contains("console.log(") {
        return Err("RuntimeError: Log functions (e.g., 'console.log' or 'print') are strictly \
             FORBIDDEN in this environment. You must use return data via the function return \
             only. Rewrite the code immediately."
            .into());
    }

    if code.contains("async ") || code.contains("await") || code.contains("async(") {
        return Err("RuntimeError: Async functions are strictly FORBIDDEN in this environment. \
             You must use synchronous, blocking calls (e.g., 'const x = tool()', NOT 'await \
             tool()'). Rewrite the code immediately."
            .into());
    }

    Ok(())
}

// Wraps a tool as `toolName(args)` in script space. The script-side shim
// checks the argument count and forwards through the single native
// `__host_call` entry point; the host side runs the tool function and decides
// between decoded JSON, raw string and error-value results.
fn bind_tool(session: &Session, tool: &Tool, handle: &Handle) -> crate::Result<()> {
    let function = tool.function.clone().ok_or_else(|| {
        crate::Error::validation(format!(
            "PTC tool {} has no callback function attached",
            tool.name
        ))
    })?;

    let name = tool.name.clone();
    let handle = handle.clone();
    let cancel_slot = session.cancel_slot();

    let host: HostFn = Box::new(move |args_json: &str| -> String {
        let argument: Value = serde_json::from_str(args_json).unwrap_or(Value::Null);
        let call = ToolCall::new(String::new(), name.clone(), argument);
        let cancel = cancel_slot
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default();

        match handle.block_on(function(cancel, call)) {
            Ok(response) => {
                // Valid JSON is decoded in script space; anything else is
                // observed as the raw string.
                if serde_json::from_str::<serde::de::IgnoredAny>(&response).is_ok() {
                    response
                } else {
                    Value::String(response).to_string()
                }
            }
            // Error text goes back as a value so the model can self-correct.
            Err(e) => json!({ "ok": false, "error": e.to_string() }).to_string(),
        }
    });

    session.bind(&tool.name, host, binding_shim(&tool.name))
}

fn binding_shim(name: &str) -> String {
    let quoted = Value::String(name.to_string()).to_string();
    format!(
        r#"globalThis[{quoted}] = function () {{
    if (arguments.length !== 1) {{
        return {{ error: {quoted} + " expects a single configuration object argument, but received " + arguments.length + " arguments. Usage: " + {quoted} + "({{ key: val }})" }};
    }}
    var __args = JSON.stringify(arguments[0]);
    if (__args === undefined) {{ __args = "null"; }}
    return JSON.parse(__host_call({quoted}, __args));
}};
"#,
        quoted = quoted
    )
}

struct ArgField {
    name: String,
    ts_type: String,
    required: bool,
}

// Parameter order is deterministic: schema properties are stored sorted.
fn extract_args(schema: Option<&Schema>) -> Vec<ArgField> {
    let Some(schema) = schema else {
        return Vec::new();
    };
    schema
        .properties
        .iter()
        .map(|(name, prop)| ArgField {
            name: name.clone(),
            ts_type: map_param_type(prop),
            required: schema.is_required(name),
        })
        .collect()
}

fn map_param_type(schema: &Schema) -> String {
    match schema.schema_type {
        SchemaType::String => "string",
        SchemaType::Number | SchemaType::Integer => "number",
        SchemaType::Boolean => "boolean",
        SchemaType::Array => "any[]",
        SchemaType::Object => "object",
    }
    .to_string()
}

/// Render one tool as a TypeScript-flavored declaration for the prompt.
///
/// Tools without a usable response schema are marked `/* Unknown Schema */`
/// to signal the model that it may need to probe the result shape.
pub fn format_tool_signature(tool: &Tool) -> String {
    let args = extract_args(tool.argument_schema.as_ref());

    let arg_block = if args.is_empty() {
        "{}".to_string()
    } else {
        let fields: Vec<String> = args
            .iter()
            .map(|a| {
                let mut name = a.name.clone();
                if !a.required {
                    name.push('?');
                }
                format!("  {}: {}", name, a.ts_type)
            })
            .collect();
        format!("{{\n{}\n}}", fields.join(",\n"))
    };

    // Only a present schema with content counts as known; empty objects mean
    // the tool author did not describe the response.
    let known = match tool.response_schema.as_ref() {
        None => false,
        Some(s) => !(s.schema_type == SchemaType::Object && s.properties.is_empty()),
    };

    let (return_type, warning) = if known {
        (schema_to_ts(tool.response_schema.as_ref().unwrap()), "")
    } else {
        ("unknown".to_string(), " /* Unknown Schema */")
    };

    format!(
        "/**\n * {}\n * @returns {{{}}}{}\n */\ndeclare function {}(params: {}): {};",
        tool.description, return_type, warning, tool.name, arg_block, return_type
    )
}

/// Recursively convert a schema node into a TypeScript type string.
pub fn schema_to_ts(schema: &Schema) -> String {
    match schema.schema_type {
        SchemaType::String => "string".to_string(),
        SchemaType::Number | SchemaType::Integer => "number".to_string(),
        SchemaType::Boolean => "boolean".to_string(),
        SchemaType::Array => match &schema.items {
            Some(items) => format!("{}[]", schema_to_ts(items)),
            None => "any[]".to_string(),
        },
        SchemaType::Object => {
            if schema.properties.is_empty() {
                return "Record<string, any>".to_string();
            }
            let mut out = String::from("{ ");
            for (name, prop) in &schema.properties {
                let opt = if schema.is_required(name) { "" } else { "?" };
                out.push_str(&format!("{}{}: {}; ", name, opt, schema_to_ts(prop)));
            }
            out.push('}');
            out
        }
    }
}
