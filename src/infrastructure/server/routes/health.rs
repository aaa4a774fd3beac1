use super::super::dto::{EndpointMap, HealthResponse, ServiceInfo};
use super::super::state::ServerState;
use crate::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use std::sync::Arc;
use tracing::debug;

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Current agent health", body = HealthResponse)
    )
)]
pub async fn health_handler<P: ModelProvider + 'static>(
    State(state): State<Arc<ServerState<P>>>,
) -> Json<HealthResponse> {
    let status = state.runtime().status().await;
    debug!(health = status.health.as_str(), "Serving /health request");
    Json(HealthResponse {
        status: status.health,
        tools: status.tools,
        detail: status.detail,
    })
}

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service metadata", body = ServiceInfo)
    )
)]
pub async fn root_handler<P: ModelProvider + 'static>(
    State(_state): State<Arc<ServerState<P>>>,
) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: EndpointMap {
            chat: "/agent",
            health: "/health",
            docs: "/docs",
        },
    })
}
