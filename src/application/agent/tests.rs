use super::*;
use crate::mcp::{SessionError, ToolInvoker, TransportError};
use crate::model::{ModelError, ModelProvider, ModelRequest};
use crate::types::{MessageRole, ModelReply, ToolCallRequest, ToolDescriptor};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
struct ScriptedProvider {
    replies: Arc<Mutex<Vec<ModelReply>>>,
    recordings: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            recordings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn requests(&self) -> Vec<ModelRequest> {
        self.recordings.lock().await.clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        self.recordings.lock().await.push(request);
        let mut replies = self.replies.lock().await;
        if replies.is_empty() {
            return Err(ModelError::InvalidResponse("script exhausted".into()));
        }
        Ok(replies.remove(0))
    }
}

struct StubInvoker {
    result: Result<Value, String>,
}

#[async_trait]
impl ToolInvoker for StubInvoker {
    async fn invoke(&self, tool: &str, _arguments: Value) -> Result<Value, SessionError> {
        match &self.result {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(SessionError::Invoke {
                tool: tool.to_string(),
                source: TransportError::Transport(message.clone()),
            }),
        }
    }
}

fn yield_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: "get_yields".into(),
        description: Some("Current pool yields".into()),
        input_schema: None,
    }
}

fn call(name: &str) -> ToolCallRequest {
    ToolCallRequest {
        id: "call-1".into(),
        name: name.into(),
        arguments: json!({"chain": "base"}),
    }
}

fn agent(
    provider: &ScriptedProvider,
    tools: Vec<ToolDescriptor>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    max_rounds: usize,
) -> Agent<ScriptedProvider> {
    Agent::new(
        Arc::new(provider.clone()),
        "gpt-test",
        "be precise",
        tools,
        invoker,
        max_rounds,
    )
}

#[tokio::test]
async fn returns_final_answer_without_tool_traffic() {
    let provider = ScriptedProvider::new(vec![ModelReply::Answer("done".into())]);
    let agent = agent(&provider, Vec::new(), None, 8);

    let outcome = agent.run(&[], "hello world").await.expect("turn succeeds");

    assert_eq!(outcome.response, "done");
    assert!(outcome.steps.is_empty());

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages[0].role, MessageRole::System);
    assert_eq!(requests[0].messages[1].content, "hello world");
}

#[tokio::test]
async fn executes_tool_call_and_feeds_result_back() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::ToolCalls(vec![call("get_yields")]),
        ModelReply::Answer("aave pays 4.2%".into()),
    ]);
    let invoker = Arc::new(StubInvoker {
        result: Ok(json!({"content": [{"type": "text", "text": "4.2%"}]})),
    });
    let agent = agent(&provider, vec![yield_tool()], Some(invoker), 8);

    let outcome = agent.run(&[], "best yields?").await.expect("turn succeeds");

    assert_eq!(outcome.response, "aave pays 4.2%");
    assert_eq!(outcome.steps.len(), 1);
    assert!(outcome.steps[0].success);
    assert_eq!(outcome.steps[0].message.as_deref(), Some("4.2%"));

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 2);
    let second = &requests[1].messages;
    let tool_message = second
        .iter()
        .find(|msg| msg.role == MessageRole::Tool)
        .expect("tool result in follow-up request");
    assert_eq!(tool_message.content, "4.2%");
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call-1"));
}

#[tokio::test]
async fn tool_failure_becomes_error_result_not_turn_abort() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::ToolCalls(vec![call("get_yields")]),
        ModelReply::Answer("the yield feed is down right now".into()),
    ]);
    let invoker = Arc::new(StubInvoker {
        result: Err("connection reset".into()),
    });
    let agent = agent(&provider, vec![yield_tool()], Some(invoker), 8);

    let outcome = agent.run(&[], "best yields?").await.expect("turn completes");

    assert_eq!(outcome.response, "the yield feed is down right now");
    assert_eq!(outcome.steps.len(), 1);
    assert!(!outcome.steps[0].success);

    let requests = provider.requests().await;
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|msg| msg.role == MessageRole::Tool)
        .expect("tool result present");
    assert!(tool_message.content.starts_with("Error:"));
    assert!(tool_message.content.contains("connection reset"));
}

#[tokio::test]
async fn unknown_tool_is_reported_without_invoking() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::ToolCalls(vec![call("drain_wallet")]),
        ModelReply::Answer("that tool does not exist".into()),
    ]);
    let invoker = Arc::new(StubInvoker {
        result: Ok(json!({"content": []})),
    });
    let agent = agent(&provider, vec![yield_tool()], Some(invoker), 8);

    let outcome = agent.run(&[], "try it").await.expect("turn completes");

    assert!(!outcome.steps[0].success);
    assert!(
        outcome.steps[0]
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("unknown tool")
    );
}

#[tokio::test]
async fn missing_session_degrades_to_error_result() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::ToolCalls(vec![call("get_yields")]),
        ModelReply::Answer("no live data available".into()),
    ]);
    let agent = agent(&provider, vec![yield_tool()], None, 8);

    let outcome = agent.run(&[], "best yields?").await.expect("turn completes");

    assert!(!outcome.steps[0].success);
    assert_eq!(outcome.response, "no live data available");
}

#[tokio::test]
async fn pathological_tool_loop_hits_the_round_cap() {
    let replies = std::iter::repeat_with(|| ModelReply::ToolCalls(vec![call("get_yields")]))
        .take(10)
        .collect();
    let provider = ScriptedProvider::new(replies);
    let invoker = Arc::new(StubInvoker {
        result: Ok(json!({"content": [{"type": "text", "text": "again"}]})),
    });
    let agent = agent(&provider, vec![yield_tool()], Some(invoker), 3);

    let error = agent.run(&[], "loop forever").await.expect_err("capped");
    assert!(matches!(error, AgentError::RoundLimit { limit: 3 }));

    // Three executed rounds plus the capped fourth request.
    assert_eq!(provider.requests().await.len(), 4);
}

#[tokio::test]
async fn history_precedes_the_new_user_message() {
    let provider = ScriptedProvider::new(vec![ModelReply::Answer("still here".into())]);
    let agent = agent(&provider, Vec::new(), None, 8);
    let history = vec![
        crate::types::ChatMessage::new(MessageRole::User, "first"),
        crate::types::ChatMessage::new(MessageRole::Assistant, "re: first"),
    ];

    agent.run(&history, "second").await.expect("turn succeeds");

    let requests = provider.requests().await;
    let contents: Vec<_> = requests[0]
        .messages
        .iter()
        .map(|msg| msg.content.as_str())
        .collect();
    assert_eq!(contents, vec!["be precise", "first", "re: first", "second"]);
}
