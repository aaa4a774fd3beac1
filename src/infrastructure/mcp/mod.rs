mod session;
mod transport;

pub use session::{McpSession, SessionError, ToolInvoker, extract_text, is_error_result};
pub use transport::{HttpTransport, TransportError};
