//! Copy-on-modify request builder.
//!
//! Every configuration method clones the generator and returns the clone, so
//! one parameterized template can seed many conversations without
//! cross-contamination. The clone is deep for all request parameters; the
//! prompter, the script runtime session and the cancellation handle are
//! shared by reference.

use crate::gen::{Request, Response, StreamResponse};
use crate::model::Model;
use crate::prompt::Prompt;
use crate::provider::Prompter;
use crate::ptc::{self, ProgramLanguage};
use crate::schema::Schema;
use crate::tool::{CancelHandle, Tool};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Generator {
    prompter: Arc<dyn Prompter>,
    pub request: Request,
    runtime: Option<Arc<ptc::Runtime>>,
    // Pre-adaptation tool list, kept so that add_tools and set_ptc_language
    // re-adapt from the originals instead of an already-adapted set.
    source_tools: Vec<Tool>,
}

impl Generator {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Generator {
            prompter,
            request: Request::default(),
            runtime: None,
            source_tools: Vec::new(),
        }
    }

    /// Issue one completion over the captured request plus `prompts`.
    pub async fn prompt(&self, prompts: &[Prompt]) -> crate::Result<Response> {
        self.prompter.set_request(self.request.clone());
        self.prompter.prompt(prompts).await
    }

    /// Issue one streaming completion.
    pub async fn stream(
        &self,
        prompts: &[Prompt],
    ) -> crate::Result<mpsc::Receiver<StreamResponse>> {
        let mut request = self.request.clone();
        request.stream = true;
        self.prompter.set_request(request);
        self.prompter.stream(prompts).await
    }

    fn update(&self, f: impl FnOnce(&mut Request)) -> Generator {
        let mut next = self.clone();
        f(&mut next.request);
        next
    }

    pub fn set_config(&self, request: Request) -> Generator {
        let mut next = self.clone();
        next.request = request;
        next
    }

    pub fn model(&self, model: Model) -> Generator {
        self.update(|r| r.model = model)
    }

    pub fn system(&self, prompt: impl Into<String>) -> Generator {
        let prompt = prompt.into();
        self.update(|r| r.system_prompt = Some(prompt))
    }

    pub fn output(&self, schema: Schema) -> Generator {
        self.update(|r| r.output_schema = Some(schema))
    }

    pub fn clear_output(&self) -> Generator {
        self.update(|r| r.output_schema = None)
    }

    /// Derive the output schema from a Rust type.
    pub fn output_of<T: schemars::JsonSchema>(&self) -> Generator {
        self.output(crate::schema::from_type::<T>())
    }

    pub fn strict_output(&self, strict: bool) -> Generator {
        self.update(|r| r.strict_output = strict)
    }

    pub fn stop_at(&self, stop: impl IntoIterator<Item = impl Into<String>>) -> Generator {
        let stop: Vec<String> = stop.into_iter().map(Into::into).collect();
        self.update(|r| r.stop_sequences = stop)
    }

    pub fn temperature(&self, temperature: f64) -> Generator {
        self.update(|r| r.temperature = Some(temperature))
    }

    pub fn frequency_penalty(&self, penalty: f64) -> Generator {
        self.update(|r| r.frequency_penalty = Some(penalty))
    }

    pub fn presence_penalty(&self, penalty: f64) -> Generator {
        self.update(|r| r.presence_penalty = Some(penalty))
    }

    pub fn top_p(&self, top_p: f64) -> Generator {
        self.update(|r| r.top_p = Some(top_p))
    }

    pub fn top_k(&self, top_k: u32) -> Generator {
        self.update(|r| r.top_k = Some(top_k))
    }

    pub fn max_tokens(&self, max_tokens: u32) -> Generator {
        self.update(|r| r.max_tokens = Some(max_tokens))
    }

    /// Thinking budget in tokens. Providers that only know effort levels
    /// translate the number on their side.
    pub fn thinking_budget(&self, budget: u32) -> Generator {
        self.update(|r| r.thinking_budget = Some(budget))
    }

    pub fn include_thinking_parts(&self, include: bool) -> Generator {
        self.update(|r| r.thinking_parts = Some(include))
    }

    pub fn with_cancel(&self, cancel: CancelHandle) -> Generator {
        self.update(|r| r.cancel = Some(cancel))
    }

    /// The tool set as it will be sent to the provider (post adaptation).
    pub fn tools(&self) -> &[Tool] {
        &self.request.tools
    }

    /// The tool set as it was handed to the builder (pre adaptation).
    pub fn source_tools(&self) -> &[Tool] {
        &self.source_tools
    }

    /// Replace the tool set. PTC-enabled tools are collapsed into a single
    /// `code_execution` tool and bound into the script session, which is
    /// created on first use.
    pub fn set_tools(&self, tools: impl IntoIterator<Item = Tool>) -> Generator {
        let tools: Vec<Tool> = tools.into_iter().collect();
        let mut next = self.clone();
        next.source_tools = tools.clone();
        next.request.tools = next.adapt_ptc_tools(tools);
        next
    }

    /// Add tools to the existing (pre-adaptation) set.
    pub fn add_tools(&self, tools: impl IntoIterator<Item = Tool>) -> Generator {
        let mut combined = self.source_tools.clone();
        combined.extend(tools);
        self.set_tools(combined)
    }

    /// Record the tool-choice policy. For a sentinel tool only the choice is
    /// recorded; for a concrete tool the tool set is replaced with exactly
    /// that tool.
    pub fn set_tool_config(&self, tool: Tool) -> Generator {
        let mut next = self.clone();
        next.request.tool_config = Some(tool.clone());
        if tool.is_control() {
            return next;
        }
        next.source_tools = vec![tool.clone()];
        next.request.tools = vec![tool];
        next
    }

    /// Switch the PTC target language and re-adapt the current tools.
    pub fn set_ptc_language(&self, language: ProgramLanguage) -> Generator {
        let mut next = self.clone();
        next.request.ptc_language = language;
        let source = next.source_tools.clone();
        next.request.tools = next.adapt_ptc_tools(source);
        next
    }

    /// Use a specific script runtime (e.g. one with a custom timeout) for
    /// subsequent PTC adaptation.
    pub fn with_runtime(&self, runtime: Arc<ptc::Runtime>) -> Generator {
        let mut next = self.clone();
        next.runtime = Some(runtime);
        next
    }

    /// Tear down the script session, if one exists. The next PTC use starts
    /// from a blank interpreter.
    pub fn reset_runtime_session(&self) {
        if let Some(runtime) = &self.runtime {
            runtime.reset();
        }
    }

    // Collapse PTC tools into the synthetic tool and set the system fragment.
    // On adapter failure the PTC tools degrade to regular tool calling.
    fn adapt_ptc_tools(&mut self, tools: Vec<Tool>) -> Vec<Tool> {
        let (mut regular, ptc_tools) = ptc::extract_ptc_tools(tools);
        if ptc_tools.is_empty() {
            self.request.ptc_system_fragment.clear();
            return regular;
        }

        let runtime = self
            .runtime
            .get_or_insert_with(|| Arc::new(ptc::Runtime::new()))
            .clone();

        match ptc::adapt_tools_to_ptc(&runtime, &ptc_tools, self.request.ptc_language) {
            Ok((unified, fragment)) => {
                regular.push(unified);
                self.request.ptc_system_fragment = fragment;
            }
            Err(err) => {
                tracing::warn!(error = %err, "error adapting PTC tools; using them as regular tools");
                regular.extend(ptc_tools);
                self.request.ptc_system_fragment.clear();
            }
        }
        regular
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::Response;
    use async_trait::async_trait;

    struct NullPrompter;

    #[async_trait]
    impl Prompter for NullPrompter {
        fn set_request(&self, _request: Request) {}

        async fn prompt(&self, _prompts: &[Prompt]) -> crate::Result<Response> {
            Err(crate::Error::provider("no backend"))
        }

        async fn stream(
            &self,
            _prompts: &[Prompt],
        ) -> crate::Result<mpsc::Receiver<StreamResponse>> {
            Err(crate::Error::provider("no backend"))
        }
    }

    fn generator() -> Generator {
        Generator::new(Arc::new(NullPrompter)).model(Model::new("OpenAI", "gpt-4o-mini"))
    }

    #[test]
    fn builders_do_not_touch_the_original() {
        let base = generator().temperature(0.2).system("base");
        let before = serde_json::to_string(&base.request).unwrap();

        let _a = base.temperature(1.7);
        let _b = base.system("changed").max_tokens(64);
        let _c = base.stop_at(["\n"]).top_p(0.9).top_k(40);
        let _d = base.set_tools([Tool::new("t")]);
        let _e = base.set_tool_config(Tool::required());

        let after = serde_json::to_string(&base.request).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn set_tool_config_replaces_set_for_concrete_tool() {
        let g = generator().set_tools([Tool::new("a"), Tool::new("b")]);

        let specific = g.set_tool_config(Tool::new("a"));
        assert_eq!(specific.tools().len(), 1);
        assert_eq!(specific.tools()[0].name, "a");
        assert_eq!(specific.request.tool_config.as_ref().unwrap().name, "a");

        let sentinel = g.set_tool_config(Tool::auto());
        assert_eq!(sentinel.tools().len(), 2);
        assert_eq!(sentinel.request.tool_config.as_ref().unwrap().name, "auto");
    }

    #[tokio::test]
    async fn ptc_tools_collapse_into_code_execution() {
        let g = generator().set_tools([
            Tool::new("plain").function(|_c, _call| async { Ok("{}".into()) }),
            Tool::new("scripted")
                .use_ptc(true)
                .function(|_c, _call| async { Ok("{}".into()) }),
        ]);

        let names: Vec<&str> = g.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["plain", "code_execution"]);
        assert!(g
            .request
            .ptc_system_fragment
            .contains("declare function scripted"));
        assert_eq!(g.source_tools().len(), 2);
    }

    #[tokio::test]
    async fn unimplemented_language_degrades_to_regular_tools() {
        let g = generator()
            .set_ptc_language(ProgramLanguage::Python)
            .set_tools([Tool::new("scripted")
                .use_ptc(true)
                .function(|_c, _call| async { Ok("{}".into()) })]);

        let names: Vec<&str> = g.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["scripted"]);
        assert!(g.request.ptc_system_fragment.is_empty());
    }
}
