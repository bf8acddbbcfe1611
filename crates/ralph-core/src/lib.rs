#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
//! Data model and collaborator traits for the ralph agent execution engine.
//!
//! This crate defines the wire-level types (`ToolCall`, `ToolResult`,
//! `ParsedResponse`, `Message`), the interrupt flag shared across the
//! process, the IPC frame format used to proxy approval prompts out of a
//! subagent, and the traits the core consumes from out-of-scope
//! collaborators (LLM transport, terminal UI, tool implementations,
//! conversation persistence). Nothing in this crate executes a tool call
//! or makes a policy decision — see `ralph-policy`, `ralph-subagent`, and
//! `ralph-orchestrator` for that.

mod budget;
mod error;
mod interrupt;
mod ipc;
mod message;
mod response;
mod tool;
mod traits;

pub use budget::{BudgetOutcome, BudgetStatus};
pub use error::RuntimeError;
pub use interrupt::{clear_interrupt, install_sigint_handler, interrupt_flag, InterruptFlag};
pub use ipc::{read_frame, write_frame, ApprovalOutcome, ApprovalRequestFrame, ApprovalResponseFrame, FrameError};
pub use message::{Message, Role};
pub use response::ParsedResponse;
pub use tool::{ToolCall, ToolResult};
pub use traits::{ConversationStore, LoopState, OutputSink, RoundTripClient, ToolExecCtx, ToolRegistry, TransportError};
