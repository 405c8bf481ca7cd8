//! Provider-agnostic LLM client contract plus the concrete clients that
//! implement it.

pub mod mock;
pub mod openai;
pub mod wrapper;

pub use wrapper::{ClientWrapper, ToolDefinition};
