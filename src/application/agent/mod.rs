mod errors;
mod models;
mod runner;
#[cfg(test)]
mod tests;

pub use errors::AgentError;
pub use models::{ToolStep, TurnOutcome};
pub use runner::Agent;
