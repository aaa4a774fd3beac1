use crate::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("agent exceeded {limit} tool rounds in a single turn")]
    RoundLimit { limit: usize },
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
            AgentError::RoundLimit { .. } => {
                "The agent could not reach an answer within the allowed number of tool calls. Try rephrasing your request."
                    .to_string()
            }
        }
    }
}
