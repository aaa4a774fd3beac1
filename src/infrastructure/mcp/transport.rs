use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const MCP_SESSION_HEADER: &str = "mcp-session-id";
const ACCEPTED_TYPES: &str = "application/json, text/event-stream";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error talking to tool server: {0}")]
    Network(#[from] reqwest::Error),
    #[error("tool server returned status {status}")]
    Status { status: u16 },
    #[error("tool server returned invalid JSON: {source}")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },
    #[error("tool server returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("tool server transport error: {0}")]
    Transport(String),
}

/// JSON-RPC 2.0 over streamable HTTP. One transport per tool-server endpoint;
/// the `mcp-session-id` header handed out at initialize time is echoed on
/// every subsequent call.
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    endpoint: String,
    session: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            endpoint: endpoint.into(),
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.lock().expect("session id lock").clone()
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let body = self.post(&payload).await?.ok_or_else(|| {
            TransportError::Transport(format!("empty response to request '{method}'"))
        })?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(TransportError::Rpc { code, message });
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.post(&payload).await?;
        Ok(())
    }

    /// Terminate the remote session, if one was ever established. Servers
    /// without session termination answer 405, which counts as closed.
    pub async fn close(&self) -> Result<(), TransportError> {
        let Some(session) = self.session.lock().expect("session id lock").take() else {
            return Ok(());
        };

        let response = self
            .http
            .request(Method::DELETE, &self.endpoint)
            .header(MCP_SESSION_HEADER, session)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }

    async fn post(&self, payload: &Value) -> Result<Option<Value>, TransportError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .header(ACCEPT, ACCEPTED_TYPES)
            .json(payload);
        if let Some(session) = self.session_id() {
            request = request.header(MCP_SESSION_HEADER, session);
        }

        let response = request.send().await?;

        if let Some(session) = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut current = self.session.lock().expect("session id lock");
            if current.as_deref() != Some(session) {
                debug!(session, "Captured tool server session id");
                *current = Some(session.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let value = if event_stream || body.trim_start().starts_with("event:") {
            parse_sse_payload(&body)?
        } else {
            serde_json::from_str(&body)?
        };
        Ok(Some(value))
    }
}

/// Streamable-HTTP servers may frame the JSON-RPC response as a one-shot
/// server-sent-event stream; the message sits in the first data frame.
fn parse_sse_payload(body: &str) -> Result<Value, TransportError> {
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            return Ok(serde_json::from_str(data)?);
        }
    }
    Err(TransportError::Transport(
        "no data frame in event-stream response".to_string(),
    ))
}
