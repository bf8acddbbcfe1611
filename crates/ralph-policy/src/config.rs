use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allowlist::Allowlist;
use crate::category::Category;
use crate::protected_files::ProtectedFileCache;
use crate::rate_limiter::RateLimiter;

/// The disposition a `Category` is configured with (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Runs without a prompt.
    Allow,
    /// Requires an approval prompt.
    Gate,
    /// Never allowed.
    Deny,
}

/// The open end of the approval-proxy IPC: present only when this process
/// is itself a subagent, in which case `prompt` forwards requests to the
/// parent instead of drawing a TTY dialog directly (spec.md §3, §4.2).
///
/// Owns the two pipe fds as `File`s so every later read/write goes
/// through safe `std::io`; the one unsafe step (claiming ownership of fds
/// this process inherited at `exec`, communicated via the
/// `APPROVAL_REQUEST_FD`/`APPROVAL_RESPONSE_FD` env vars) happens exactly
/// once, here, rather than being repeated at every call site.
pub struct ApprovalChannel {
    request_writer: Mutex<std::fs::File>,
    response_reader: Mutex<std::fs::File>,
    /// The parent process's pid, for diagnostics.
    pub peer_pid: i32,
    next_request_id: Mutex<u32>,
}

impl ApprovalChannel {
    /// Builds a channel over the given fds, which this call takes
    /// ownership of.
    ///
    /// # Safety
    ///
    /// `request_fd` and `response_fd` must be open, valid, and not owned
    /// by anything else in this process — exactly the contract the
    /// subagent spawn protocol (spec.md §4.2) establishes when it exports
    /// them via environment variables before `exec`.
    #[allow(unsafe_code)]
    pub unsafe fn from_raw_fds(request_fd: std::os::fd::RawFd, response_fd: std::os::fd::RawFd, peer_pid: i32) -> Self {
        use std::os::fd::FromRawFd;
        Self {
            request_writer: Mutex::new(std::fs::File::from_raw_fd(request_fd)),
            response_reader: Mutex::new(std::fs::File::from_raw_fd(response_fd)),
            peer_pid,
            next_request_id: Mutex::new(1),
        }
    }

    /// Allocates the next `request_id`, unique for this channel's lifetime.
    pub fn next_id(&self) -> u32 {
        let mut guard = self.next_request_id.lock().expect("approval channel mutex poisoned");
        let id = *guard;
        *guard = guard.wrapping_add(1);
        id
    }

    /// Locks and returns the request-writer handle for one frame write.
    pub fn request_writer(&self) -> std::sync::MutexGuard<'_, std::fs::File> {
        self.request_writer.lock().expect("approval channel mutex poisoned")
    }

    /// Locks and returns the response-reader handle for one frame read.
    pub fn response_reader(&self) -> std::sync::MutexGuard<'_, std::fs::File> {
        self.response_reader.lock().expect("approval channel mutex poisoned")
    }

    /// Blocks up to `timeout` for the response pipe to have a byte (or
    /// EOF) ready, so a caller can bound its wait before `read_frame`
    /// (spec.md §4.2: "the child blocks on its response fd with a
    /// bounded read"). Returns `false` on timeout, so the caller can
    /// treat an unresponsive parent the same as a broken pipe.
    ///
    /// # Safety
    ///
    /// `poll` is called on an fd this struct owns for its lifetime, with
    /// a single stack-local `pollfd`; no pointer escapes the call.
    #[allow(unsafe_code)]
    pub fn wait_response_ready(&self, timeout: Duration) -> bool {
        use std::os::fd::AsRawFd;

        let guard = self.response_reader.lock().expect("approval channel mutex poisoned");
        let fd = guard.as_raw_fd();
        drop(guard);

        let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        ret > 0
    }
}

/// Session-lifetime approval policy: category dispositions, allowlists,
/// the rate limiter, the protected-file cache, and (for a subagent) the
/// channel back to the parent's TTY (spec.md §3).
pub struct ApprovalConfig {
    /// Master switch; when false every gate resolves to `Allow`.
    pub enabled: bool,
    /// Whether stdin is attached to a terminal.
    pub is_interactive: bool,
    /// Per-category disposition.
    category_action: Mutex<HashMap<Category, Action>>,
    /// Regex and shell-prefix allowlists.
    pub allowlist: Mutex<Allowlist>,
    /// Denial tracking / backoff.
    pub rate_limiter: RateLimiter,
    /// Protected-path cache.
    pub protected_files: ProtectedFileCache,
    /// Present when this process is a subagent.
    pub approval_channel: Option<ApprovalChannel>,
}

impl ApprovalConfig {
    /// Builds a config with every category defaulting to `Gate` except
    /// `FileRead`, which defaults to `Allow` (reading is rarely
    /// sensitive and gating it on every turn would make the agent
    /// unusable — this mirrors the teacher's and every competing
    /// agent's default).
    pub fn new(is_interactive: bool, protected_files: ProtectedFileCache) -> Self {
        let mut category_action = HashMap::new();
        category_action.insert(Category::FileRead, Action::Allow);
        category_action.insert(Category::FileWrite, Action::Gate);
        category_action.insert(Category::Shell, Action::Gate);
        category_action.insert(Category::Network, Action::Gate);
        category_action.insert(Category::Memory, Action::Allow);
        category_action.insert(Category::Subagent, Action::Gate);
        category_action.insert(Category::Mcp, Action::Gate);
        category_action.insert(Category::Other, Action::Gate);

        Self {
            enabled: true,
            is_interactive,
            category_action: Mutex::new(category_action),
            allowlist: Mutex::new(Allowlist::new()),
            rate_limiter: RateLimiter::new(),
            protected_files,
            approval_channel: None,
        }
    }

    /// The action configured for `category`, defaulting to `Gate` if
    /// unset (fail toward asking, never toward silently allowing).
    pub fn action_for(&self, category: Category) -> Action {
        self.category_action
            .lock()
            .expect("category action mutex poisoned")
            .get(&category)
            .copied()
            .unwrap_or(Action::Gate)
    }

    /// Overrides the action for `category` (used by config loading).
    pub fn set_action(&self, category: Category, action: Action) {
        self.category_action
            .lock()
            .expect("category action mutex poisoned")
            .insert(category, action);
    }

    /// Whether this process is a subagent (has a channel back to a parent).
    pub fn is_subagent(&self) -> bool {
        self.approval_channel.is_some()
    }
}

/// The outcome of `PolicyEngine::check` (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Runs without a prompt.
    Allow,
    /// Blocked outright: the category's action is `Deny`.
    Deny,
    /// Requires an approval prompt.
    RequiresPrompt,
    /// Targets a protected file; never overridable by allowlists.
    ProtectedFile(String),
    /// In backoff after repeated denials.
    RateLimited(u64),
}

/// The outcome of `PolicyEngine::prompt` (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResult {
    /// Approved for this call only.
    Allowed,
    /// Approved, and a session allowlist pattern was installed.
    AllowedAlways,
    /// Denied.
    Denied,
    /// SIGINT during the prompt.
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;

    #[allow(unsafe_code)]
    fn channel_over(response_reader: UnixStream) -> ApprovalChannel {
        // The request side is unused by these tests; any valid fd pair works.
        let (request_reader, _unused) = UnixStream::pair().expect("socketpair");
        unsafe { ApprovalChannel::from_raw_fds(request_reader.into_raw_fd(), response_reader.into_raw_fd(), 0) }
    }

    #[test]
    fn wait_response_ready_times_out_when_nothing_is_written() {
        let (_writer, reader) = UnixStream::pair().expect("socketpair");
        let channel = channel_over(reader);

        let start = std::time::Instant::now();
        assert!(!channel.wait_response_ready(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn wait_response_ready_returns_true_once_a_reply_is_written() {
        let (mut writer, reader) = UnixStream::pair().expect("socketpair");
        let channel = channel_over(reader);

        writer.write_all(b"x").expect("write");
        assert!(channel.wait_response_ready(Duration::from_secs(1)));
    }
}
