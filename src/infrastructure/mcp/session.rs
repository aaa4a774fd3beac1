use super::transport::{HttpTransport, TransportError};
use crate::types::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("MCP handshake failed: {source}")]
    Handshake {
        #[source]
        source: TransportError,
    },
    #[error("tool discovery failed: {source}")]
    Discovery {
        #[source]
        source: TransportError,
    },
    #[error("tool '{tool}' invocation failed: {source}")]
    Invoke {
        tool: String,
        #[source]
        source: TransportError,
    },
}

/// Calling convention the reasoning loop consumes: invoke a discovered tool
/// by name with JSON arguments.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, SessionError>;
}

/// Live protocol session over one transport. Initialized before any tool
/// call, torn down exactly once.
#[derive(Debug)]
pub struct McpSession {
    transport: HttpTransport,
    closed: AtomicBool,
}

impl McpSession {
    /// Perform the protocol handshake. Any failure here is a
    /// [`SessionError::Handshake`], which callers treat as "no tool access"
    /// rather than a fatal startup error.
    pub async fn connect(transport: HttpTransport) -> Result<Self, SessionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });

        let result = transport
            .request("initialize", params)
            .await
            .map_err(|source| SessionError::Handshake { source })?;
        debug!(
            server_version = result
                .pointer("/serverInfo/version")
                .and_then(|v| v.as_str()),
            "MCP handshake accepted"
        );

        transport
            .notify("notifications/initialized", json!({}))
            .await
            .map_err(|source| SessionError::Handshake { source })?;

        Ok(Self {
            transport,
            closed: AtomicBool::new(false),
        })
    }

    /// Discover the remote tool catalogue. Entries without a usable name or
    /// with a non-object schema are skipped so one malformed tool cannot
    /// abort discovery of the rest.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let result = self
            .transport
            .request("tools/list", json!({}))
            .await
            .map_err(|source| SessionError::Discovery { source })?;
        Ok(parse_tool_list(result))
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, SessionError> {
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            },
        });
        self.transport
            .request("tools/call", params)
            .await
            .map_err(|source| SessionError::Invoke {
                tool: tool.to_string(),
                source,
            })
    }

    /// Idempotent teardown; only the first call reaches the transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await
    }
}

#[async_trait]
impl ToolInvoker for McpSession {
    async fn invoke(&self, tool: &str, arguments: Value) -> Result<Value, SessionError> {
        self.call_tool(tool, arguments).await
    }
}

fn parse_tool_list(result: Value) -> Vec<ToolDescriptor> {
    let Some(entries) = result.get("tools").and_then(Value::as_array) else {
        warn!("tools/list result carries no tool array");
        return Vec::new();
    };

    let mut tools = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(name) = entry
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
        else {
            warn!("Skipping tool entry without a name");
            continue;
        };

        let schema = match entry.get("inputSchema") {
            None | Some(Value::Null) => None,
            Some(schema) if schema.is_object() => Some(schema.clone()),
            Some(_) => {
                warn!(tool = name, "Skipping tool with non-object input schema");
                continue;
            }
        };

        tools.push(ToolDescriptor {
            name: name.to_string(),
            description: entry
                .get("description")
                .and_then(Value::as_str)
                .map(|text| text.to_string()),
            input_schema: schema,
        });
    }
    tools
}

/// Flatten the text blocks of an MCP tool result for the conversation.
pub fn extract_text(result: &Value) -> Option<String> {
    if let Some(blocks) = result.get("content").and_then(Value::as_array) {
        let mut parts = Vec::new();
        for block in blocks {
            if block
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| kind.eq_ignore_ascii_case("text"))
                .unwrap_or(false)
            {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        parts.push(trimmed.to_string());
                    }
                }
            }
        }
        if !parts.is_empty() {
            return Some(parts.join("\n"));
        }
    }

    if let Some(message) = result
        .pointer("/structuredContent/error/message")
        .and_then(Value::as_str)
    {
        let trimmed = message.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    None
}

pub fn is_error_result(result: &Value) -> bool {
    result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_list_skips_malformed_entries() {
        let result = json!({
            "tools": [
                {"name": "get_yields", "description": "Current pool yields",
                 "inputSchema": {"type": "object", "properties": {"chain": {"type": "string"}}}},
                {"description": "nameless"},
                {"name": "   "},
                {"name": "bad_schema", "inputSchema": "not-an-object"},
                {"name": "compare_protocols"},
            ]
        });

        let tools = parse_tool_list(result);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_yields");
        assert!(tools[0].input_schema.is_some());
        assert_eq!(tools[1].name, "compare_protocols");
        assert!(tools[1].input_schema.is_none());
    }

    #[test]
    fn tool_list_tolerates_missing_array() {
        assert!(parse_tool_list(json!({})).is_empty());
        assert!(parse_tool_list(json!({"tools": "nope"})).is_empty());
    }

    #[test]
    fn extract_text_joins_text_blocks() {
        let result = json!({
            "content": [
                {"type": "text", "text": "  line one "},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"},
            ]
        });
        assert_eq!(
            extract_text(&result).as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn extract_text_falls_back_to_structured_error() {
        let result = json!({
            "content": [],
            "structuredContent": {"error": {"message": "rate limited"}}
        });
        assert_eq!(extract_text(&result).as_deref(), Some("rate limited"));
    }

    #[test]
    fn error_flag_defaults_to_false() {
        assert!(!is_error_result(&json!({"content": []})));
        assert!(is_error_result(&json!({"isError": true})));
    }
}
