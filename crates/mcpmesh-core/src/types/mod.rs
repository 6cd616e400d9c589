//! Capability descriptors and handler outputs.
//!
//! Descriptors serialize with MCP field names so that they can cross a
//! proxy boundary unchanged.

mod capability;
mod content;
mod prompt;
mod resource;
mod tool;

pub use capability::{
    Annotations, Capability, CapabilityKind, CapabilityList, CapabilitySummary, Tags,
};
pub use content::{Content, Role};
pub use prompt::{GetPromptResult, Prompt, PromptArgument, PromptMessage};
pub use resource::{Resource, ResourceContents, ResourceTemplate};
pub use tool::{Tool, ToolOutput};
