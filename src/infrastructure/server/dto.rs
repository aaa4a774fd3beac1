use crate::agent::ToolStep;
use crate::lifecycle::Health;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AgentChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AgentChatResponse {
    pub response: String,
    pub session_id: String,
    pub tool_steps: Vec<ToolStep>,
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: Health,
    pub tools: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: EndpointMap,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointMap {
    pub chat: &'static str,
    pub health: &'static str,
    pub docs: &'static str,
}
