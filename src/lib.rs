mod application;
pub mod config;
mod domain;
mod infrastructure;

pub use application::{agent, lifecycle, repl, sessions};
pub use domain::types;
pub use infrastructure::{mcp, model, server};
