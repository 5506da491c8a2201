//! Provider-agnostic request and response types
//!
//! Wire formats in [`crate::protocol`] are built from and converted into
//! these.

pub mod message;
pub mod response;
pub mod tool;

pub use message::{ChatTurn, ImageInput, InlineImage, Role};
pub use response::{AttemptOutcome, AttemptRecord, BackendReply, Diagnostics, RouterResponse, TokenUsage, UsageRecord};
pub use tool::{FunctionCall, ToolDeclaration, ToolSet};
