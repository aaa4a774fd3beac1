use super::errors::AgentError;
use super::models::{ToolStep, TurnOutcome};
use crate::mcp::{ToolInvoker, extract_text, is_error_result};
use crate::model::{ModelProvider, ModelRequest};
use crate::types::{ChatMessage, MessageRole, ModelReply, ToolCallRequest, ToolDescriptor};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The reasoning loop: query the model, execute requested tool calls, feed
/// results back, until the model answers in text or the round cap is hit.
pub struct Agent<P: ModelProvider> {
    provider: Arc<P>,
    model: String,
    system_prompt: String,
    tools: Vec<ToolDescriptor>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    max_rounds: usize,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(
        provider: Arc<P>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<ToolDescriptor>,
        invoker: Option<Arc<dyn ToolInvoker>>,
        max_rounds: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: system_prompt.into(),
            tools,
            invoker,
            max_rounds,
        }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Run one conversation turn on top of the stored history. The working
    /// message list grows with tool traffic as the turn progresses; the
    /// caller decides what to persist afterwards.
    pub async fn run(
        &self,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::new(MessageRole::System, &self.system_prompt));
        }
        messages.extend_from_slice(history);
        messages.push(ChatMessage::new(MessageRole::User, prompt));

        let mut steps = Vec::new();
        let mut rounds = 0;

        loop {
            debug!(
                rounds,
                messages = messages.len(),
                "Submitting agent turn to model provider"
            );
            let reply = self
                .provider
                .complete(ModelRequest {
                    model: self.model.clone(),
                    messages: messages.clone(),
                    tools: self.tools.clone(),
                })
                .await?;

            match reply {
                ModelReply::Answer(response) => {
                    info!(tool_steps = steps.len(), "Agent produced final answer");
                    return Ok(TurnOutcome { response, steps });
                }
                ModelReply::ToolCalls(calls) => {
                    if rounds == self.max_rounds {
                        warn!(limit = self.max_rounds, "Agent exceeded tool round cap");
                        return Err(AgentError::RoundLimit {
                            limit: self.max_rounds,
                        });
                    }
                    rounds += 1;

                    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in calls {
                        let step = self.execute(&call).await;
                        messages.push(ChatMessage::tool_result(&call.id, step_payload(&step)));
                        steps.push(step);
                    }
                }
            }
        }
    }

    /// Execute one requested call. Never fails the turn: every failure mode
    /// is folded into an error-bearing tool result the model can react to.
    async fn execute(&self, call: &ToolCallRequest) -> ToolStep {
        let Some(invoker) = &self.invoker else {
            warn!(tool = %call.name, "Tool requested but no tool server session is available");
            return failure_step(call, "tool server connection is not available");
        };

        if !self.tools.iter().any(|tool| tool.name == call.name) {
            warn!(requested_tool = %call.name, "Unknown tool requested by model");
            return failure_step(call, format!("unknown tool: {}", call.name));
        }

        info!(tool = %call.name, "Agent requested tool execution");
        match invoker.invoke(&call.name, call.arguments.clone()).await {
            Ok(output) => {
                let success = !is_error_result(&output);
                let message = extract_text(&output);
                info!(tool = %call.name, success, "Tool executed");
                ToolStep {
                    tool: call.name.clone(),
                    input: call.arguments.clone(),
                    success,
                    output,
                    message,
                }
            }
            Err(err) => {
                warn!(tool = %call.name, %err, "Tool execution failed");
                failure_step(call, err.to_string())
            }
        }
    }
}

fn failure_step(call: &ToolCallRequest, message: impl Into<String>) -> ToolStep {
    ToolStep {
        tool: call.name.clone(),
        input: call.arguments.clone(),
        success: false,
        output: Value::Null,
        message: Some(message.into()),
    }
}

/// Text fed back to the model as the tool result for one step.
fn step_payload(step: &ToolStep) -> String {
    if step.success {
        match &step.message {
            Some(text) => text.clone(),
            None => step.output.to_string(),
        }
    } else {
        let detail = step.message.as_deref().unwrap_or("tool execution failed");
        format!("Error: {detail}")
    }
}
