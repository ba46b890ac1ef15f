//! Media transformation adapters.

pub mod tools;

pub use tools::{ExternalMediaTools, ToolsConfig, run_tool};
