use crate::lifecycle::AgentRuntime;
use crate::model::ModelProvider;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive chat loop. One conversation lives for the whole process; chat
/// errors are printed and the loop continues.
pub async fn run<P>(runtime: Arc<AgentRuntime<P>>) -> Result<(), ReplError>
where
    P: ModelProvider + 'static,
{
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = session_id.as_str(), "Entering interactive chat");

    let mut stdout = io::stdout();
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();

    stdout
        .write_all(b"Agent chat. Type 'exit', 'quit', or 'q' to end the conversation.\n")
        .await?;

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
            stdout.write_all(b"Goodbye.\n").await?;
            break;
        }

        match runtime.chat(input, Some(session_id.clone())).await {
            Ok(outcome) => {
                let reply = format!("Agent: {}\n\n", outcome.response);
                stdout.write_all(reply.as_bytes()).await?;
            }
            Err(err) => {
                let message = format!("Error: {}\n\n", err.user_message());
                stdout.write_all(message.as_bytes()).await?;
            }
        }
        stdout.flush().await?;
    }

    Ok(())
}
