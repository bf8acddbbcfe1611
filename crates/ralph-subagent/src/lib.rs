#![warn(missing_docs)]
#![warn(unreachable_pub)]
//! OS-process subagent supervisor for the ralph agent execution engine.
//!
//! A subagent is a whole second instance of the same binary, spawned via
//! `std::process::Command` in `--subagent` mode, connected to its parent
//! over three pipes: captured stdout+stderr, and an approval-proxy
//! request/response pair that lets the child's gated tool calls prompt on
//! the *parent's* TTY (spec.md §3, §4.2).
//!
//! This crate's unsafe surface is the `fcntl` calls needed to flip
//! `O_NONBLOCK`/`FD_CLOEXEC` on raw pipe fds; there is no safe `std`
//! equivalent for mutating flags on an fd `std` did not create. The
//! workspace denies `unsafe_code` by default — this crate overrides that
//! at the module level (see `manager.rs`) rather than at the crate root,
//! keeping the rest of the crate (in particular `record.rs` and
//! `error.rs`) under the default deny.

mod error;
mod manager;
mod record;

pub use error::SubagentError;
pub use manager::{SubagentManager, SubagentSnapshot, DEFAULT_MAX, DEFAULT_TIMEOUT, HARD_CAP, MAX_TIMEOUT};
pub use record::Status;
