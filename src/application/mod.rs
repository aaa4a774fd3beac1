pub mod agent;
pub mod lifecycle;
pub mod repl;
pub mod sessions;
