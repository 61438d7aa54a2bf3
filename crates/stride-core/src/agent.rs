//! The turn loop: model call, tool batch, phased execution, results.
//!
//! State carried across turns is the growing message log, the set of tool
//! names seen so far, and the run configuration. Each turn asks the model
//! for a completion; a response with tool calls goes through the
//! analyze -> plan -> execute pipeline and its results are appended as
//! tool messages in emission order; a response without tool calls ends the
//! run once every required tool has been seen. Anything the model can react
//! to stays inside the loop as a tool result; only transport failures,
//! empty completions, and running out of steps are fatal.

use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestToolMessageArgs, ChatCompletionTool,
    ChatCompletionToolChoiceOption, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    ReasoningEffort,
};
use async_openai::Client;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{Config, ToolChoice};
use crate::error::{Error, Result};
use crate::executor::run_phases;
use crate::planner::plan_phases;
use crate::progress::Progress;
use crate::prompt;
use crate::toolcall::{annotate, ToolCall};
use crate::tools::{Dispatch, Toolbox};

/// Correlation id used for requirement-reminder tool messages.
const REQUIREMENT_ID: &str = "requirement";

/// The agent: an OpenAI client, the workspace toolbox, and the message log.
pub struct Agent {
    client: Client<OpenAIConfig>,
    config: Config,
    toolbox: Arc<Toolbox>,
    progress: Arc<Progress>,
    messages: Vec<ChatCompletionRequestMessage>,
    tools: Vec<ChatCompletionTool>,
    tools_seen: HashSet<String>,
}

impl Agent {
    /// Construct the agent from configuration. Authentication comes from
    /// `OPENAI_API_KEY`.
    pub fn new(config: Config) -> Self {
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        let progress = Arc::new(Progress::new(config.log));
        let toolbox = Arc::new(Toolbox::new(config.src.clone(), Arc::clone(&progress)));
        Self {
            client,
            config,
            toolbox,
            progress,
            messages: Vec::new(),
            tools: Vec::new(),
            tools_seen: HashSet::new(),
        }
    }

    /// Main loop: prompt, model, tools, results, repeat.
    ///
    /// Returns `Ok(())` when the assistant replies without tool calls and
    /// every required tool has been seen during the run.
    pub async fn run(&mut self) -> Result<()> {
        self.messages = prompt::initial_messages(&self.config.src, &self.config.prompt)?;
        self.tools = prompt::tool_schemas();
        self.progress.banner(&self.config);

        for step in 0..self.config.steps {
            debug!(step, messages = self.messages.len(), "requesting completion");
            let request = self.build_request()?;
            let response = match timeout(self.config.timeout, self.client.chat().create(request))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(Error::ApiTimeout(self.config.timeout)),
            };
            let Some(choice) = response.choices.into_iter().next() else {
                return Err(Error::EmptyCompletion);
            };
            let message = choice.message;
            let batch = message.tool_calls.clone().unwrap_or_default();
            self.push_assistant(message.content.clone(), batch.clone())?;

            if batch.is_empty() {
                let missing = missing_required_tools(&self.config.require_tools, &self.tools_seen);
                if !missing.is_empty() {
                    // Nudge the model instead of terminating short of its
                    // obligations.
                    self.push_tool_message(
                        REQUIREMENT_ID,
                        &format!(
                            "The following tools are required but were not called: {}. Please call them as needed.",
                            missing.join(", ")
                        ),
                    )?;
                    continue;
                }
                self.progress
                    .assistant(message.content.as_deref().unwrap_or_default());
                return Ok(());
            }

            let mut calls: Vec<ToolCall> = batch
                .iter()
                .map(|tc| {
                    ToolCall::new(
                        tc.id.clone(),
                        tc.function.name.clone(),
                        tc.function.arguments.clone(),
                    )
                })
                .collect();
            let mut turn_seen = HashSet::new();
            for call in &mut calls {
                annotate(&self.config.src, call);
                turn_seen.insert(call.name.clone());
                self.tools_seen.insert(call.name.clone());
            }

            let schedule = plan_phases(&calls);
            debug!(
                calls = calls.len(),
                phases = schedule.layers.len(),
                sequential = schedule.sequential,
                "executing tool batch"
            );
            let dispatcher: Arc<dyn Dispatch> = Arc::clone(&self.toolbox) as Arc<dyn Dispatch>;
            let results =
                run_phases(dispatcher, &calls, &schedule, self.config.concurrency).await?;
            for result in results {
                self.push_tool_message(&result.id, &result.text)?;
            }

            let missing = missing_required_tools(&self.config.require_tools, &turn_seen);
            if !missing.is_empty() {
                self.push_tool_message(
                    REQUIREMENT_ID,
                    &format!(
                        "Required tools still missing: {}. Please call them.",
                        missing.join(", ")
                    ),
                )?;
            }
        }

        Err(Error::MaxSteps)
    }

    fn build_request(&self) -> Result<CreateChatCompletionRequest> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.config.model.clone())
            .messages(self.messages.clone())
            .tools(self.tools.clone())
            .tool_choice(tool_choice_option(self.config.tool_choice));
        if is_reasoning_model(&self.config.model) {
            builder.reasoning_effort(ReasoningEffort::High);
        } else {
            builder.temperature(0.1);
        }
        Ok(builder.build()?)
    }

    fn push_assistant(
        &mut self,
        content: Option<String>,
        tool_calls: Vec<ChatCompletionMessageToolCall>,
    ) -> Result<()> {
        let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
        if let Some(content) = content {
            builder.content(content);
        }
        if !tool_calls.is_empty() {
            builder.tool_calls(tool_calls);
        }
        self.messages.push(builder.build()?.into());
        Ok(())
    }

    fn push_tool_message(&mut self, call_id: &str, text: &str) -> Result<()> {
        self.messages.push(
            ChatCompletionRequestToolMessageArgs::default()
                .content(text.to_string())
                .tool_call_id(call_id.to_string())
                .build()?
                .into(),
        );
        Ok(())
    }
}

/// Reasoning-class models take an effort knob instead of a temperature.
fn is_reasoning_model(model: &str) -> bool {
    let model = model.to_lowercase();
    model.starts_with("gpt-5") || model.starts_with('o')
}

fn tool_choice_option(choice: ToolChoice) -> ChatCompletionToolChoiceOption {
    match choice {
        ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
        ToolChoice::Required => ChatCompletionToolChoiceOption::Required,
        ToolChoice::None => ChatCompletionToolChoiceOption::None,
    }
}

/// Names in `required` not present in `seen`, preserving input order.
fn missing_required_tools(required: &[String], seen: &HashSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|name| !seen.contains(*name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_required_tools_tracks_seen_set() {
        let required = names(&["write_file", "read_file"]);
        let mut seen = HashSet::new();
        assert_eq!(
            missing_required_tools(&required, &seen),
            names(&["write_file", "read_file"])
        );

        seen.insert("write_file".to_string());
        assert_eq!(missing_required_tools(&required, &seen), names(&["read_file"]));

        seen.insert("read_file".to_string());
        assert!(missing_required_tools(&required, &seen).is_empty());
    }

    #[test]
    fn no_requirements_means_nothing_missing() {
        let seen = HashSet::new();
        assert!(missing_required_tools(&[], &seen).is_empty());
    }

    #[test]
    fn reasoning_models_are_detected_by_prefix() {
        assert!(is_reasoning_model("gpt-5-mini"));
        assert!(is_reasoning_model("GPT-5"));
        assert!(is_reasoning_model("o3"));
        assert!(is_reasoning_model("O1-preview"));
        assert!(!is_reasoning_model("gpt-4o"));
    }
}
