#![allow(dead_code)]

use async_trait::async_trait;
use quirk_agent::config::AppConfig;
use quirk_agent::model::{ModelError, ModelProvider, ModelRequest};
use quirk_agent::types::ModelReply;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Model double that replays queued replies and records every request.
#[derive(Clone)]
pub struct ScriptedProvider {
    replies: Arc<Mutex<Vec<ModelReply>>>,
    recordings: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            recordings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn answering(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| ModelReply::Answer(text.to_string()))
                .collect(),
        )
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
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

/// Configuration pointed at the given MCP endpoint, with spawning disabled
/// by way of a nonexistent entry script.
pub fn test_config(mcp_url: &str) -> AppConfig {
    AppConfig {
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        mcp_url: mcp_url.to_string(),
        model: "gpt-test".to_string(),
        api_base: "http://127.0.0.1:1".to_string(),
        api_key: "sk-test".to_string(),
        prompt_path: PathBuf::from("does-not-exist/prompt.md"),
        server_command: "node".to_string(),
        server_script: PathBuf::from("does-not-exist/index.js"),
        max_tool_rounds: 4,
        max_sessions: 8,
    }
}

/// An endpoint nothing listens on; connecting must fail fast.
pub const UNREACHABLE_MCP_URL: &str = "http://127.0.0.1:1/mcp";
