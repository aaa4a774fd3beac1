use super::super::dto::{AgentChatRequest, AgentChatResponse, ErrorResponse};
use super::super::state::ServerState;
use crate::lifecycle::ChatError;
use crate::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

#[utoipa::path(
    post,
    path = "/agent",
    tag = "agent",
    request_body = AgentChatRequest,
    responses(
        (status = 200, description = "Chat turn completed", body = AgentChatResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Chat turn failed", body = ErrorResponse),
        (status = 503, description = "Agent not ready", body = ErrorResponse)
    )
)]
pub async fn chat_handler<P: ModelProvider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
    Json(payload): Json<AgentChatRequest>,
) -> Result<Json<AgentChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        session = payload.session_id.as_deref(),
        "Received /agent request"
    );

    if payload.message.trim().is_empty() {
        error!("Rejecting /agent request due to empty message");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message cannot be empty".to_string(),
            }),
        ));
    }

    let runtime = state.runtime();
    match runtime.chat(&payload.message, payload.session_id).await {
        Ok(outcome) => {
            info!(
                session_id = outcome.session_id.as_str(),
                "Chat request completed successfully"
            );
            Ok(Json(AgentChatResponse {
                response: outcome.response,
                session_id: outcome.session_id,
                tool_steps: outcome.steps,
                timestamp: Utc::now(),
            }))
        }
        Err(error @ ChatError::NotReady) => {
            error!("Rejecting /agent request before runtime is ready");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: error.user_message(),
                }),
            ))
        }
        Err(error) => {
            error!(%error, "Chat turn failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: error.user_message(),
                }),
            ))
        }
    }
}
