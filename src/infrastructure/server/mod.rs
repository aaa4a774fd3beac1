pub mod dto;
mod routes;
mod state;

use crate::agent::ToolStep;
use crate::lifecycle::{AgentRuntime, Health};
use crate::model::ModelProvider;
use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::agent::chat_handler,
        routes::health::health_handler,
        routes::health::root_handler
    ),
    components(
        schemas(
            dto::AgentChatRequest,
            dto::AgentChatResponse,
            dto::ErrorResponse,
            dto::HealthResponse,
            dto::ServiceInfo,
            dto::EndpointMap,
            ToolStep,
            Health
        )
    ),
    tags(
        (name = "agent", description = "Chat with the tool-backed agent"),
        (name = "health", description = "Service health and metadata")
    )
)]
struct ApiDoc;

/// Router over a shared runtime; split out from [`serve`] so tests can drive
/// it against an ephemeral listener.
pub fn router<P>(runtime: Arc<AgentRuntime<P>>) -> Router
where
    P: ModelProvider + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let state = Arc::new(state::ServerState::new(runtime));
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/", get(routes::health::root_handler::<P>))
        .route("/agent", post(routes::agent::chat_handler::<P>))
        .route("/health", get(routes::health::health_handler::<P>))
        .layer(cors)
        .with_state(state)
}

/// Serve until ctrl-c. The caller owns the runtime and tears it down after
/// this returns.
pub async fn serve<P>(runtime: Arc<AgentRuntime<P>>, addr: SocketAddr) -> Result<(), ServerError>
where
    P: ModelProvider + 'static,
{
    info!(%addr, "Binding HTTP server");
    let app = router(runtime);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "HTTP server ready to accept connections");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(ServerError::Serve)
}
