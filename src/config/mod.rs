use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8000";
const DEFAULT_MCP_URL: &str = "http://localhost:3000/mcp";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_BASE: &str = "https://api.openai.com";
const DEFAULT_PROMPT_PATH: &str = "prompt/prompt.md";
const DEFAULT_SERVER_COMMAND: &str = "node";
const DEFAULT_SERVER_SCRIPT: &str = "../mcp/dist/index.js";
const DEFAULT_MAX_TOOL_ROUNDS: &str = "8";
const DEFAULT_MAX_SESSIONS: &str = "256";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub mcp_url: String,
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    pub prompt_path: PathBuf,
    pub server_command: String,
    pub server_script: PathBuf,
    pub max_tool_rounds: usize,
    pub max_sessions: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host: IpAddr = parse_var("HOST", DEFAULT_HOST)?;
        let port: u16 = parse_var("PORT", DEFAULT_PORT)?;
        let api_key = env_or("OPENAI_API_KEY", "");
        if api_key.is_empty() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY"));
        }

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            mcp_url: env_or("MCP_SERVER_URL", DEFAULT_MCP_URL),
            model: env_or("OPENAI_MODEL", DEFAULT_MODEL),
            api_base: env_or("OPENAI_BASE_URL", DEFAULT_API_BASE),
            api_key,
            prompt_path: PathBuf::from(env_or("AGENT_PROMPT_PATH", DEFAULT_PROMPT_PATH)),
            server_command: env_or("MCP_SERVER_COMMAND", DEFAULT_SERVER_COMMAND),
            server_script: PathBuf::from(env_or("MCP_SERVER_SCRIPT", DEFAULT_SERVER_SCRIPT)),
            max_tool_rounds: parse_var("AGENT_MAX_TOOL_ROUNDS", DEFAULT_MAX_TOOL_ROUNDS)?,
            max_sessions: parse_var("AGENT_MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
        })
    }

    /// Port the configured MCP URL points at, used to bind a self-spawned
    /// tool server to the same place the transport will connect to.
    pub fn mcp_port(&self) -> Option<u16> {
        let rest = self.mcp_url.split_once("://").map(|(_, rest)| rest)?;
        let authority = rest.split(['/', '?']).next()?;
        let port = authority.rsplit_once(':')?.1;
        port.parse().ok()
    }

    /// System prompt from the configured file, falling back to a built-in
    /// default when the file is absent or unreadable.
    pub fn system_prompt(&self) -> String {
        match fs::read_to_string(&self.prompt_path) {
            Ok(content) => {
                debug!(path = %self.prompt_path.display(), "Loaded system prompt from file");
                content.trim().to_string()
            }
            Err(_) => {
                info!(
                    path = %self.prompt_path.display(),
                    "System prompt file not found; using built-in default"
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_or(key, default);
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: raw,
        reason: err.to_string(),
    })
}
