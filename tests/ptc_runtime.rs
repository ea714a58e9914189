//! Programmatic tool-calling end-to-end: adapter, sandbox, guardrails.

mod common;

use common::*;
use serde_json::{json, Value};
use skald::agent;
use skald::ptc::{EvalOutcome, Runtime};
use skald::{CancelHandle, Prompt, Tool, ToolCall};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BATCH_SCRIPT: &str = r#"({f: predict_future({question:"future?"}), s: convert_currency({amount:69,from:"USD",to:"SEK"}), p: generate_password({length:12,special:true})})"#;

async fn run_code(generator: &skald::Generator, script: &str) -> String {
    let tool = generator
        .tools()
        .iter()
        .find(|t| t.name == "code_execution")
        .expect("code_execution tool present")
        .clone();
    let function = tool.function.clone().expect("executor attached");
    function(
        CancelHandle::new(),
        ToolCall::new("x", "code_execution", json!({ "code": script })),
    )
    .await
    .expect("executor never fails terminally on script errors")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ptc_batch_script_calls_every_binding_once() {
    let prompter = ScriptedPrompter::new(vec![
        tool_call_response(&[("c1", "code_execution", json!({"code": BATCH_SCRIPT}))]),
        text_response("all done"),
    ]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let result = agent::run::<String>(
        5,
        0,
        &generator,
        vec![Prompt::user(
            "Predict future, convert 69 USD to SEK, generate a password.",
        )],
    )
    .await
    .unwrap();

    assert_eq!(result.result, "all done");
    assert_eq!(result.depth, 1);
    assert_eq!(result.prompts.len(), 3);
    assert_call_response_pairing(&result.prompts);

    let response = match &result.prompts[2] {
        Prompt::ToolResponse { tool_response } => &tool_response.response,
        other => panic!("expected tool response, got {:?}", other),
    };
    let decoded: Value = serde_json::from_str(response).unwrap();
    assert_eq!(decoded["f"], "The stars say yes.");
    // "724.50" parses as JSON, so the script observes a number.
    assert_eq!(decoded["s"], json!(724.5));
    assert_eq!(decoded["p"].as_str().unwrap().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn guardrail_failure_is_visible_to_the_model_not_the_caller() {
    let prompter = ScriptedPrompter::new(vec![
        tool_call_response(&[("c1", "code_execution", json!({"code": "await fetch(\"evil\")"}))]),
        tool_call_response(&[("c2", "code_execution", json!({"code": "({ok: true})"}))]),
        text_response("recovered"),
    ]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let result = agent::run::<String>(5, 0, &generator, vec![Prompt::user("go")])
        .await
        .unwrap();

    assert_eq!(result.depth, 2);
    assert_eq!(result.prompts.len(), 5);

    let first_response = match &result.prompts[2] {
        Prompt::ToolResponse { tool_response } => &tool_response.response,
        other => panic!("expected tool response, got {:?}", other),
    };
    let decoded: Value = serde_json::from_str(first_response).unwrap();
    assert!(decoded["error"]
        .as_str()
        .unwrap()
        .contains("Async functions are strictly FORBIDDEN"));

    let second_response = match &result.prompts[4] {
        Prompt::ToolResponse { tool_response } => &tool_response.response,
        other => panic!("expected tool response, got {:?}", other),
    };
    assert_eq!(
        serde_json::from_str::<Value>(second_response).unwrap(),
        json!({"ok": true})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn adapter_collapses_ptc_tools_and_documents_them() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let names: Vec<&str> = generator.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["code_execution"]);

    let fragment = &generator.request.ptc_system_fragment;
    for tool in ["predict_future", "convert_currency", "generate_password"] {
        assert!(
            fragment.contains(&format!("declare function {}", tool)),
            "fragment missing signature for {}",
            tool
        );
    }
    // No response schemas on the mock tools, so all are marked unknown.
    assert_eq!(fragment.matches("/* Unknown Schema */").count(), 3);

    let code_tool = &generator.tools()[0];
    let schema = code_tool.argument_schema.as_ref().unwrap();
    assert!(schema.is_required("code"));
    assert!(code_tool.description.contains("declare function predict_future"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn variables_persist_across_calls_in_one_session() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let first = run_code(&generator, "var stash = 21;").await;
    assert_eq!(first, "null");

    let second = run_code(&generator, "stash * 2").await;
    assert_eq!(second, "42");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_script_fails_guardrails() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let response = run_code(&generator, "").await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert!(decoded["error"]
        .as_str()
        .unwrap()
        .contains("No code script provided"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_json_tool_result_stays_a_raw_string() {
    let raw = Tool::new("fetch_motto")
        .description("Company motto lookup.")
        .use_ptc(true)
        .function(|_ctx, _call| async { Ok("iron ore, delivered".to_string()) });

    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools([raw]);

    let response = run_code(
        &generator,
        "var m = fetch_motto({}); ({kind: typeof m, value: m})",
    )
    .await;
    assert_eq!(
        serde_json::from_str::<Value>(&response).unwrap(),
        json!({"kind": "string", "value": "iron ore, delivered"})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_argument_count_returns_an_error_value() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let response = run_code(
        &generator,
        r#"var r = predict_future(); ({e: r.error})"#,
    )
    .await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert!(decoded["e"]
        .as_str()
        .unwrap()
        .contains("expects a single configuration object argument"));

    let response = run_code(
        &generator,
        r#"var r2 = predict_future("a", "b"); ({e: r2.error})"#,
    )
    .await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert!(decoded["e"].as_str().unwrap().contains("received 2 arguments"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_tool_surfaces_as_error_value_in_script() {
    let failing = Tool::new("flaky")
        .description("Always fails.")
        .use_ptc(true)
        .function(|_ctx, _call| async { Err::<String, _>(skald::Error::runtime("backend down")) });

    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools([failing]);

    let response = run_code(&generator, "flaky({})").await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(decoded["ok"], json!(false));
    assert!(decoded["error"].as_str().unwrap().contains("backend down"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runtime_errors_are_reported_not_raised() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    let response = run_code(&generator, "definitely_not_defined(1)").await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert!(decoded["error"].as_str().unwrap().contains("not defined"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn infinite_loop_is_interrupted_within_the_deadline() {
    let runtime = Runtime::with_timeout(Duration::from_millis(200));
    let session = runtime.ensure_session().unwrap();

    let started = Instant::now();
    let outcome = session
        .eval("while (true) {}", &CancelHandle::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    match outcome {
        EvalOutcome::ScriptError(message) => assert!(message.contains("timeout")),
        other => panic!("expected script error, got {:?}", other),
    }
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);

    // The session stays usable after an interrupt.
    let after = session.eval("1 + 1", &CancelHandle::new()).await.unwrap();
    assert_eq!(after, EvalOutcome::Value("2".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn executor_reports_timeouts_to_the_model() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter)
        .with_runtime(Arc::new(Runtime::with_timeout(Duration::from_millis(200))))
        .set_tools(mock_ptc_tools());

    let response = run_code(&generator, "while (true) {}").await;
    let decoded: Value = serde_json::from_str(&response).unwrap();
    assert!(decoded["error"].as_str().unwrap().contains("timeout"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_reset_clears_state() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    run_code(&generator, "var keepsake = 7;").await;
    generator.reset_runtime_session();

    // Rebind after reset, then the old global is gone.
    let generator = generator.set_ptc_language(skald::ptc::ProgramLanguage::JavaScript);
    let response = run_code(&generator, "typeof keepsake").await;
    assert_eq!(response, "\"undefined\"");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logging_polyfills_are_inert() {
    let prompter = ScriptedPrompter::new(vec![]);
    let generator = generator_for(prompter).set_tools(mock_ptc_tools());

    // The guardrails block console.log(, but console.warn and print-as-value
    // must exist and do nothing.
    let response = run_code(&generator, "console.warn('x'); typeof print").await;
    assert_eq!(response, "\"function\"");
}
