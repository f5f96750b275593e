//! Tools module - tool registry and the built-in release tools

pub mod registry;
pub mod release;

pub use registry::{ToolDefinition, ToolHandler, ToolRegistry};
pub use release::register_release_tools;
