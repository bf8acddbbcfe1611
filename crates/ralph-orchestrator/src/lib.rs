#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
//! Orchestration context, batch executor, and iterative loop: the
//! top-level control flow of the ralph agent execution engine.
//!
//! This crate owns none of the out-of-scope collaborators (LLM
//! transport, UI, tool implementations, conversation persistence) —
//! those are consumed through the traits `ralph-core` defines. It ties
//! `ralph-policy`'s approval decisions and `ralph-subagent`'s process
//! supervision into one session-lifetime control loop.

mod batch;
mod context;
mod error;
mod loop_;

pub use batch::{BatchExecutor, BatchOutcome};
pub use context::OrchestrationContext;
pub use error::OrchestratorError;
pub use loop_::{EndReason, IterativeLoop, MAX_ITERATIONS};
