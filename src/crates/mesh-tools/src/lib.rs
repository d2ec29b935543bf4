//! # mesh-tools — tool trait, registry, and the coordination tool
//!
//! An [`Agent`](https://docs.rs/mesh-core) exposes its callable tools as an
//! `Arc<dyn ToolRegistry>`; this crate defines that trait and the one it
//! dispatches to, plus [`handoff::HandoffTool`], the `handoff_to_agent`
//! definition a swarm injects into every member's tool list.

pub mod error;
pub mod handoff;
pub mod registry;
pub mod tool;

pub use error::{Result, ToolError};
pub use handoff::{HandoffTool, HANDOFF_TOOL_NAME};
pub use registry::{InMemoryToolRegistry, ToolRegistry};
pub use tool::{Tool, ToolCall, ToolCallResult, ToolOutput};
