//! Built-in tools and the registry that dispatches mid-run tool calls.

pub mod knowledge;
pub mod registry;
pub mod search;

pub use registry::{Tool, ToolContext, ToolRegistry};
