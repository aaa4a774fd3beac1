use clap::{Parser, ValueEnum};
use quirk_agent::config::AppConfig;
use quirk_agent::lifecycle::AgentRuntime;
use quirk_agent::model::OpenAiClient;
use quirk_agent::{repl, server};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "quirk-agent",
    version,
    about = "HTTP gateway for an MCP-backed chat agent"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = RunMode::Rest)]
    mode: RunMode,
    /// Connect to an already-running tool server instead of spawning one.
    #[arg(long)]
    no_spawn: bool,
    /// Prompt for `ask` mode.
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    Rest,
    Repl,
    Ask,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        mcp_url = config.mcp_url.as_str(),
        model = config.model.as_str(),
        "Configuration loaded"
    );

    let provider = OpenAiClient::new(config.api_base.clone(), config.api_key.clone());
    let runtime = Arc::new(AgentRuntime::new(provider, config));
    let health = runtime.initialize(!cli.no_spawn).await?;
    info!(health = health.as_str(), mode = ?cli.mode, "Starting in selected mode");

    match cli.mode {
        RunMode::Rest => {
            let addr = runtime.config().bind_addr;
            server::serve(Arc::clone(&runtime), addr).await?;
        }
        RunMode::Repl => {
            repl::run(Arc::clone(&runtime)).await?;
        }
        RunMode::Ask => {
            let prompt = cli.prompt.join(" ");
            if prompt.trim().is_empty() {
                runtime.close().await.ok();
                return Err("prompt required in ask mode".into());
            }
            let outcome = runtime.chat(prompt.trim(), None).await?;
            let output = json!({
                "session_id": outcome.session_id,
                "response": outcome.response,
                "tool_steps": outcome.steps,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if let Err(err) = runtime.close().await {
        warn!(%err, "Teardown finished with errors");
    }
    info!("Agent gateway stopped");
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
