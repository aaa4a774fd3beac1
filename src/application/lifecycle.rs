use crate::agent::{Agent, AgentError, ToolStep};
use crate::config::AppConfig;
use crate::mcp::{HttpTransport, McpSession, ToolInvoker};
use crate::model::ModelProvider;
use crate::sessions::SessionStore;
use crate::types::{ChatMessage, MessageRole};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const CONNECT_RETRIES_AFTER_SPAWN: usize = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
const CHILD_EXIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Health {
    pub fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub health: Health,
    pub tools: usize,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub session_id: String,
    pub steps: Vec<ToolStep>,
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("agent runtime is already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("agent is not initialised")]
    NotReady,
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ChatError {
    pub fn user_message(&self) -> String {
        match self {
            ChatError::NotReady => "The agent is still starting up. Try again shortly.".to_string(),
            ChatError::Agent(err) => err.user_message(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("teardown completed with {failures} failed step(s)")]
    Partial { failures: usize },
}

/// Owns the tool-server session, the discovered tool set, the reasoning loop
/// and the optional child process. Constructed by the entry point and shared
/// read-only with every HTTP request.
pub struct AgentRuntime<P: ModelProvider> {
    config: AppConfig,
    provider: Arc<P>,
    sessions: SessionStore,
    state: RwLock<RuntimeState<P>>,
    child: Mutex<Option<Child>>,
}

enum RuntimeState<P: ModelProvider> {
    Uninitialized,
    Ready(ReadyState<P>),
    Closed,
}

struct ReadyState<P: ModelProvider> {
    agent: Arc<Agent<P>>,
    session: Option<Arc<McpSession>>,
    degraded: Option<String>,
}

impl<P: ModelProvider + 'static> AgentRuntime<P> {
    pub fn new(provider: P, config: AppConfig) -> Self {
        let sessions = SessionStore::new(config.max_sessions);
        Self {
            config,
            provider: Arc::new(provider),
            sessions,
            state: RwLock::new(RuntimeState::Uninitialized),
            child: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Bring the runtime up. Tool-server trouble never fails startup: the
    /// agent falls back to an empty tool set and the reason is kept for
    /// health reporting. Chat availability beats tool access.
    pub async fn initialize(&self, spawn_server: bool) -> Result<Health, InitError> {
        {
            let state = self.state.read().await;
            match &*state {
                RuntimeState::Closed => return Err(InitError::Closed),
                RuntimeState::Ready(ready) => return Ok(health_of(ready)),
                RuntimeState::Uninitialized => {}
            }
        }

        let spawned = if spawn_server {
            self.spawn_tool_server().await
        } else {
            false
        };

        let (session, tools, degraded) = self.open_session(spawned).await;
        let invoker = session
            .clone()
            .map(|session| session as Arc<dyn ToolInvoker>);
        let agent = Agent::new(
            Arc::clone(&self.provider),
            self.config.model.clone(),
            self.config.system_prompt(),
            tools,
            invoker,
            self.config.max_tool_rounds,
        );

        let ready = ReadyState {
            agent: Arc::new(agent),
            session,
            degraded,
        };
        let health = health_of(&ready);
        info!(
            health = health.as_str(),
            tools = ready.agent.tools().len(),
            "Agent runtime initialised"
        );

        let mut state = self.state.write().await;
        if matches!(&*state, RuntimeState::Closed) {
            return Err(InitError::Closed);
        }
        *state = RuntimeState::Ready(ready);
        Ok(health)
    }

    /// One chat turn against the shared agent. Conversation history is keyed
    /// by session id; a fresh id is generated when the caller supplies none.
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<String>,
    ) -> Result<ChatOutcome, ChatError> {
        let agent = {
            let state = self.state.read().await;
            match &*state {
                RuntimeState::Ready(ready) => Arc::clone(&ready.agent),
                _ => return Err(ChatError::NotReady),
            }
        };

        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let history = self.sessions.history(&session_id);
        debug!(
            session_id = session_id.as_str(),
            history_count = history.len(),
            "Running chat turn with prior history"
        );

        let outcome = agent.run(&history, message).await?;
        self.sessions.record(
            &session_id,
            ChatMessage::new(MessageRole::User, message),
            ChatMessage::new(MessageRole::Assistant, outcome.response.clone()),
        );
        info!(
            session_id = session_id.as_str(),
            tool_steps = outcome.steps.len(),
            "Chat turn completed"
        );

        Ok(ChatOutcome {
            response: outcome.response,
            session_id,
            steps: outcome.steps,
        })
    }

    pub async fn status(&self) -> RuntimeStatus {
        let state = self.state.read().await;
        match &*state {
            RuntimeState::Ready(ready) => RuntimeStatus {
                health: health_of(ready),
                tools: ready.agent.tools().len(),
                detail: ready.degraded.clone(),
            },
            _ => RuntimeStatus {
                health: Health::Unhealthy,
                tools: 0,
                detail: None,
            },
        }
    }

    pub async fn health(&self) -> Health {
        self.status().await.health
    }

    /// Ordered, best-effort teardown: protocol session first, then the child
    /// process. Every step is caught independently; failures are counted and
    /// reported, never propagated mid-sequence. Safe to call repeatedly and
    /// before initialization.
    pub async fn close(&self) -> Result<(), CloseError> {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, RuntimeState::Closed)
        };

        let mut failures = 0;

        if let RuntimeState::Ready(ready) = previous {
            if let Some(session) = ready.session {
                match session.close().await {
                    Ok(()) => debug!("MCP session closed"),
                    Err(err) => {
                        warn!(%err, "Failed to close MCP session");
                        failures += 1;
                    }
                }
            }
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Tool server exited"),
                Ok(Err(err)) => {
                    warn!(%err, "Failed waiting for tool server exit");
                    failures += 1;
                }
                Err(_) => match child.kill().await {
                    Ok(()) => {
                        let _ = child.wait().await;
                        info!("Tool server killed after grace period");
                    }
                    Err(err) => {
                        warn!(%err, "Failed to kill tool server process");
                        failures += 1;
                    }
                },
            }
        }

        if failures == 0 {
            info!("Agent runtime closed");
            Ok(())
        } else {
            Err(CloseError::Partial { failures })
        }
    }

    /// Launch the bundled tool server. Returns whether a process was spawned;
    /// a missing script or spawn failure only degrades.
    async fn spawn_tool_server(&self) -> bool {
        let script = &self.config.server_script;
        if !script.exists() {
            warn!(
                path = %script.display(),
                "Tool server entry script not found; expecting an externally managed server"
            );
            return false;
        }

        let mut command = Command::new(&self.config.server_command);
        command
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(port) = self.config.mcp_port() {
            command.env("PORT", port.to_string());
        }

        match command.spawn() {
            Ok(mut child) => {
                if let Some(stdout) = child.stdout.take() {
                    forward_output(stdout, false);
                }
                if let Some(stderr) = child.stderr.take() {
                    forward_output(stderr, true);
                }
                info!(
                    command = self.config.server_command.as_str(),
                    script = %script.display(),
                    "Tool server spawned"
                );
                *self.child.lock().await = Some(child);
                true
            }
            Err(err) => {
                warn!(
                    command = self.config.server_command.as_str(),
                    %err,
                    "Failed to spawn tool server; continuing without tool access"
                );
                false
            }
        }
    }

    /// Handshake and discovery against the configured endpoint. A self-spawned
    /// server gets a short retry window to finish booting.
    async fn open_session(
        &self,
        spawned: bool,
    ) -> (
        Option<Arc<McpSession>>,
        Vec<crate::types::ToolDescriptor>,
        Option<String>,
    ) {
        let attempts = if spawned { CONNECT_RETRIES_AFTER_SPAWN } else { 1 };

        let mut last_error = None;
        for attempt in 1..=attempts {
            let transport = HttpTransport::new(self.config.mcp_url.clone());
            match McpSession::connect(transport).await {
                Ok(session) => {
                    let session = Arc::new(session);
                    return match session.list_tools().await {
                        Ok(tools) => {
                            info!(tools = tools.len(), "Discovered tool catalogue");
                            (Some(session), tools, None)
                        }
                        Err(err) => {
                            warn!(%err, "Tool discovery failed; continuing with an empty tool set");
                            (Some(session), Vec::new(), Some(err.to_string()))
                        }
                    };
                }
                Err(err) => {
                    debug!(attempt, %err, "MCP handshake attempt failed");
                    last_error = Some(err);
                    if attempt < attempts {
                        sleep(CONNECT_RETRY_DELAY).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "tool server unreachable".to_string());
        warn!(
            url = self.config.mcp_url.as_str(),
            reason = reason.as_str(),
            "MCP handshake failed; starting without tool access"
        );
        (None, Vec::new(), Some(reason))
    }
}

fn health_of<P: ModelProvider>(ready: &ReadyState<P>) -> Health {
    if ready.agent.tools().is_empty() {
        Health::Degraded
    } else {
        Health::Healthy
    }
}

fn forward_output<R>(stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!(source = "tool-server", "{line}");
            } else {
                debug!(source = "tool-server", "{line}");
            }
        }
    });
}
