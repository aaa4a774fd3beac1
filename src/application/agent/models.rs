use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// One executed tool invocation within a turn, reported back to the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ToolStep {
    pub tool: String,
    #[schema(value_type = Object)]
    pub input: Value,
    pub success: bool,
    #[schema(value_type = Object)]
    pub output: Value,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub steps: Vec<ToolStep>,
}
