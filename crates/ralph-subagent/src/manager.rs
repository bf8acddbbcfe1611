#![allow(unsafe_code)]
//! The subagent supervisor's guts: spawn, non-blocking polling, blocking
//! `get_status`, the approval-proxy relay, and teardown (spec.md §4.2).
//!
//! Unsafe code here is confined to `fcntl` calls that set `O_NONBLOCK` and
//! `FD_CLOEXEC` on raw pipe file descriptors — there is no safe
//! equivalent in `std` for flipping those flags on an fd `std` did not
//! create itself. Everything else (pipe creation, `Command::spawn`,
//! `SIGTERM`/`SIGKILL` delivery, `waitpid`) goes through safe `nix`/`std`
//! wrappers.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use ralph_core::{
    interrupt_flag, read_frame, write_frame, ApprovalOutcome, ApprovalRequestFrame, ApprovalResponseFrame, ToolCall,
};
use ralph_policy::{ApprovalConfig, PolicyEngine};

use crate::error::SubagentError;
use crate::record::{generate_id, Status, Subagent};

/// Absolute ceiling on concurrently running subagents (spec.md §4.2).
pub const HARD_CAP: usize = 32;
/// Default configured concurrency cap.
pub const DEFAULT_MAX: usize = 8;
/// Default per-subagent wall-clock timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Absolute ceiling a caller may configure a timeout to.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Marks `fd` close-on-exec so it does not leak into unrelated children
/// this process spawns later (e.g. a `shell` tool's child process).
fn set_cloexec(fd: RawFd) -> nix::Result<()> {
    unsafe { fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) }.map(|_| ())
}

/// Marks `fd` non-blocking, so polling reads never stall the supervisor
/// thread waiting on a child that has nothing to say.
fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    unsafe { fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)) }.map(|_| ())
}

struct Handle {
    subagent: Subagent,
    child: Child,
    stdout_read: File,
    approval_request_read: Option<File>,
    approval_response_write: Option<File>,
    timeout: Duration,
}

/// Supervises a bounded pool of child agent processes, each running the
/// same binary in `--subagent` mode (spec.md §4.2).
pub struct SubagentManager {
    binary_path: PathBuf,
    max_concurrent: usize,
    this_agent_id: String,
    handles: Mutex<HashMap<String, Handle>>,
    next_id: AtomicU64,
}

impl SubagentManager {
    /// Builds a manager that spawns `binary_path` for each subagent,
    /// capping concurrency at `max_concurrent` (clamped to `HARD_CAP`).
    pub fn new(binary_path: PathBuf, max_concurrent: usize, this_agent_id: impl Into<String>) -> Self {
        Self {
            binary_path,
            max_concurrent: max_concurrent.min(HARD_CAP),
            this_agent_id: this_agent_id.into(),
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of subagents currently in `Running` state.
    pub fn running_count(&self) -> usize {
        let handles = self.handles.lock().expect("subagent manager mutex poisoned");
        handles.values().filter(|h| h.subagent.status == Status::Running).count()
    }

    /// Spawns one subagent running `task` (spec.md §4.2's spawn protocol).
    /// Allocates three pipes (stdout, approval-request, approval-response),
    /// forks+execs the same binary in `--subagent` mode, and records the
    /// child. On any failure, kills and reaps a partially-started child
    /// and returns `SpawnFailed`.
    pub fn spawn(&self, task: &str, context: Option<&str>, timeout: Option<Duration>) -> Result<String, SubagentError> {
        let running = self.running_count();
        if running >= self.max_concurrent {
            return Err(SubagentError::PoolFull { running, max: self.max_concurrent });
        }

        let id = generate_id(self.next_id.fetch_add(1, Ordering::SeqCst));
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT).min(MAX_TIMEOUT);

        let (stdout_r, stdout_w) = nix::unistd::pipe().map_err(|e| SubagentError::SpawnFailed(e.to_string()))?;
        let (req_r, req_w) = nix::unistd::pipe().map_err(|e| SubagentError::SpawnFailed(e.to_string()))?;
        let (resp_r, resp_w) = nix::unistd::pipe().map_err(|e| SubagentError::SpawnFailed(e.to_string()))?;

        // Parent-retained ends must not leak into the child across exec.
        for fd in [stdout_r.as_raw_fd(), req_r.as_raw_fd(), resp_w.as_raw_fd()] {
            let _ = set_cloexec(fd);
        }
        // Child-retained ends (stdout_w, req_w, resp_r) are left without
        // CLOEXEC deliberately, so they survive exec at their current fd
        // numbers and the child can recover them from the env vars below.
        let child_req_w_num = req_w.as_raw_fd();
        let child_resp_r_num = resp_r.as_raw_fd();

        let stdout_w_file = File::from(stdout_w);
        let stderr_w_file = stdout_w_file.try_clone().map_err(|e| SubagentError::SpawnFailed(e.to_string()))?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--subagent")
            .arg("--task")
            .arg(task)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_w_file))
            .stderr(Stdio::from(stderr_w_file))
            .env("APPROVAL_REQUEST_FD", child_req_w_num.to_string())
            .env("APPROVAL_RESPONSE_FD", child_resp_r_num.to_string())
            .env("PARENT_AGENT_ID", &self.this_agent_id);
        if let Some(ctx) = context {
            command.arg("--context").arg(ctx);
        }
        // req_w/resp_r must stay alive (not dropped) until after spawn()
        // forks, so the child inherits them; they are explicitly dropped
        // below once the parent no longer needs its copies.
        let child = command.spawn();

        // The parent never uses req_w/resp_r itself; drop its copies now
        // that the fork (inside spawn, if it succeeded) has happened.
        drop(req_w);
        drop(resp_r);

        let child = match child {
            Ok(child) => child,
            Err(e) => return Err(SubagentError::SpawnFailed(e.to_string())),
        };

        let _ = set_nonblocking(stdout_r.as_raw_fd());
        let _ = set_nonblocking(req_r.as_raw_fd());

        let pid = child.id() as i32;
        let subagent = Subagent::new(id.clone(), pid, task.to_string(), context.map(str::to_string));
        let handle = Handle {
            subagent,
            child,
            stdout_read: File::from(stdout_r),
            approval_request_read: Some(File::from(req_r)),
            approval_response_write: Some(File::from(resp_w)),
            timeout,
        };

        tracing::info!(subagent_id = %id, pid, task, "spawned subagent");
        self.handles
            .lock()
            .expect("subagent manager mutex poisoned")
            .insert(id.clone(), handle);
        Ok(id)
    }

    /// Non-blocking sweep over every running subagent: advances timed-out
    /// children to `Timeout`, drains available stdout, and reaps exited
    /// children. Returns the number of state transitions observed
    /// (spec.md §4.2's `poll_all`).
    pub fn poll_all(&self) -> usize {
        let mut handles = self.handles.lock().expect("subagent manager mutex poisoned");
        let mut transitions = 0;
        for handle in handles.values_mut() {
            if handle.subagent.status != Status::Running {
                continue;
            }
            if poll_one(handle, None) {
                transitions += 1;
            }
        }
        transitions
    }

    /// Returns the current status/result of `id`. If `wait` is false, or
    /// the subagent is already in a terminal state, applies one
    /// `poll_all`-equivalent step and returns immediately. If `wait` is
    /// true, blocks (polling at ~100ms) until the subagent reaches a
    /// terminal state, handling timeouts, the process-wide interrupt
    /// flag, and approval-proxy requests as it goes (spec.md §4.2's
    /// `get_status`).
    pub fn get_status(&self, id: &str, wait: bool, parent_config: &ApprovalConfig) -> Result<SubagentSnapshot, SubagentError> {
        loop {
            {
                let mut handles = self.handles.lock().expect("subagent manager mutex poisoned");
                let handle = handles.get_mut(id).ok_or_else(|| SubagentError::NotFound(id.to_string()))?;

                if handle.subagent.status == Status::Running {
                    poll_one(handle, Some(parent_config));
                }

                if !wait || handle.subagent.status != Status::Running {
                    return Ok(snapshot(handle));
                }
            }

            if interrupt_flag().load(std::sync::atomic::Ordering::SeqCst) {
                let mut handles = self.handles.lock().expect("subagent manager mutex poisoned");
                if let Some(handle) = handles.get_mut(id) {
                    terminate(handle);
                    handle.subagent.status = Status::Failed;
                    handle.subagent.error = Some("Interrupted by user".to_string());
                    return Ok(snapshot(handle));
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Tears down every still-running subagent: SIGTERM, a grace period,
    /// then SIGKILL, then reap. Called on manager/process teardown
    /// (spec.md §4.2's cleanup).
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock().expect("subagent manager mutex poisoned");
        for handle in handles.values_mut() {
            if handle.subagent.status == Status::Running {
                terminate(handle);
            }
        }
    }
}

/// A point-in-time view of one subagent, returned by `get_status`.
#[derive(Debug, Clone)]
pub struct SubagentSnapshot {
    /// The subagent's id.
    pub id: String,
    /// Current lifecycle state.
    pub status: Status,
    /// Captured result text, once `Completed`.
    pub result: Option<String>,
    /// Captured error text, once `Failed`/`Timeout`.
    pub error: Option<String>,
}

fn snapshot(handle: &Handle) -> SubagentSnapshot {
    SubagentSnapshot {
        id: handle.subagent.id.clone(),
        status: handle.subagent.status,
        result: handle.subagent.result.clone(),
        error: handle.subagent.error.clone(),
    }
}

/// One non-blocking poll step against a single handle: checks timeout,
/// drains stdout, polls the approval-request fd (if a `parent_config` is
/// given, meaning the caller is willing to run a prompt right now), and
/// reaps the child if it has exited. Returns whether a state transition
/// occurred.
fn poll_one(handle: &mut Handle, parent_config: Option<&ApprovalConfig>) -> bool {
    if handle.subagent.start_time.elapsed() > handle.timeout {
        tracing::warn!(subagent_id = %handle.subagent.id, timeout_secs = handle.timeout.as_secs(), "subagent exceeded its timeout");
        terminate(handle);
        handle.subagent.status = Status::Timeout;
        handle.subagent.error = Some("subagent exceeded its timeout".to_string());
        return true;
    }

    drain_stdout(handle);

    if let Some(parent_config) = parent_config {
        service_one_approval_request(handle, parent_config);
    }

    reap_if_exited(handle)
}

fn drain_stdout(handle: &mut Handle) {
    let mut buf = [0u8; 4096];
    loop {
        match handle.stdout_read.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => handle.subagent.output_buffer.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(_) => break,
        }
    }
}

/// Services at most one pending approval request on `handle`'s
/// request-read fd, if one is waiting, by running the full interactive
/// prompt path on the parent's own TTY and writing back the decision
/// (spec.md §4.2's approval proxy). Tolerates a single spurious wakeup
/// (an empty read); on a confirmed broken pipe, closes both ends and
/// disables further polling for this subagent.
fn service_one_approval_request(handle: &mut Handle, parent_config: &ApprovalConfig) {
    let Some(reader) = handle.approval_request_read.as_mut() else {
        return;
    };

    if !fd_is_readable(reader.as_raw_fd()) {
        return;
    }

    let request: ApprovalRequestFrame = match read_frame(reader) {
        Ok(req) => req,
        Err(ralph_core::FrameError::Closed) => {
            handle.approval_request_read = None;
            handle.approval_response_write = None;
            return;
        }
        Err(_) => return, // tolerate one spurious/partial wakeup
    };

    let call = ToolCall {
        id: request.request_id.to_string(),
        name: request.tool_name.clone(),
        arguments: request.arguments_json.clone(),
    };
    let engine = PolicyEngine::new(parent_config);
    let (outcome, pattern) = match engine.prompt_with_pattern(&call) {
        Ok((result, pattern)) => (to_wire_outcome(result), pattern),
        Err(_) => (ApprovalOutcome::Denied, None),
    };

    let response = ApprovalResponseFrame {
        request_id: request.request_id,
        result: outcome,
        pattern,
    };

    if let Some(writer) = handle.approval_response_write.as_mut() {
        if write_frame(writer, &response).is_err() {
            handle.approval_request_read = None;
            handle.approval_response_write = None;
        }
    }
}

fn to_wire_outcome(result: ralph_policy::ApprovalResult) -> ApprovalOutcome {
    match result {
        ralph_policy::ApprovalResult::Allowed => ApprovalOutcome::Allowed,
        ralph_policy::ApprovalResult::AllowedAlways => ApprovalOutcome::AllowedAlways,
        ralph_policy::ApprovalResult::Denied => ApprovalOutcome::Denied,
        ralph_policy::ApprovalResult::Aborted => ApprovalOutcome::Aborted,
    }
}

fn fd_is_readable(fd: RawFd) -> bool {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    let mut fds = [PollFd::new(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN)];
    matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
}

fn reap_if_exited(handle: &mut Handle) -> bool {
    match handle.child.try_wait() {
        Ok(Some(status)) => {
            drain_stdout(handle);
            if status.success() {
                handle.subagent.status = Status::Completed;
                handle.subagent.result = Some(String::from_utf8_lossy(&handle.subagent.output_buffer).to_string());
                tracing::info!(subagent_id = %handle.subagent.id, "subagent completed");
            } else {
                handle.subagent.status = Status::Failed;
                let tail = tail_lines(&handle.subagent.output_buffer, 20);
                tracing::warn!(subagent_id = %handle.subagent.id, exit_status = ?status, "subagent failed");
                handle.subagent.error = Some(tail);
            }
            true
        }
        Ok(None) => false,
        Err(_) => false,
    }
}

fn tail_lines(buf: &[u8], n: usize) -> String {
    let text = String::from_utf8_lossy(buf);
    text.lines().rev().take(n).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n")
}

/// SIGTERM, a grace period, then SIGKILL; always followed by a
/// non-blocking reap attempt so the kernel doesn't accumulate a zombie.
fn terminate(handle: &mut Handle) {
    let pid = Pid::from_raw(handle.subagent.pid);
    let _ = kill(pid, Signal::SIGTERM);
    std::thread::sleep(KILL_GRACE);
    if matches!(handle.child.try_wait(), Ok(None)) {
        let _ = kill(pid, Signal::SIGKILL);
    }
    let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
    let _ = handle.child.wait();
}

impl Drop for SubagentManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_policy::ApprovalConfig;
    use ralph_policy::ProtectedFileCache;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    /// `/bin/echo` stands in for the real `--subagent` binary: it writes
    /// its argv to stdout and exits 0, which is enough to drive a real
    /// spawn through to `Completed` without needing the actual CLI.
    fn echo_manager(max_concurrent: usize) -> SubagentManager {
        SubagentManager::new(PathBuf::from("/bin/echo"), max_concurrent, "parent-1")
    }

    fn default_approval_config() -> ApprovalConfig {
        ApprovalConfig::new(false, ProtectedFileCache::new(vec![]))
    }

    fn wait_until<F: Fn() -> bool>(timeout: Duration, f: F) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if f() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Writes a small shell script that ignores its argv and sleeps,
    /// standing in for a subagent that needs to be torn down rather than
    /// let finish, so `shutdown`/`terminate` get exercised against a real
    /// process group.
    fn sleepy_script_path(dir: &tempfile::TempDir, seconds: u64) -> PathBuf {
        let path = dir.path().join("sleepy.sh");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\nsleep {seconds}\n").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn spawn_runs_to_completion_and_captures_stdout() {
        let manager = echo_manager(DEFAULT_MAX);
        let id = manager.spawn("hello subagent", None, None).unwrap();

        let config = default_approval_config();
        let snapshot = manager.get_status(&id, true, &config).unwrap();

        assert_eq!(snapshot.status, Status::Completed);
        assert!(snapshot.result.unwrap().contains("hello subagent"));
    }

    #[test]
    fn spawn_rejects_beyond_max_concurrent() {
        let manager = SubagentManager::new(PathBuf::from("/bin/echo"), 1, "parent-1");
        let _first = manager.spawn("task one", None, None).unwrap();

        let err = manager.spawn("task two", None, None).unwrap_err();
        assert!(matches!(err, SubagentError::PoolFull { running: 1, max: 1 }));
    }

    #[test]
    fn new_clamps_max_concurrent_to_hard_cap() {
        let manager = SubagentManager::new(PathBuf::from("/bin/echo"), HARD_CAP + 100, "parent-1");
        assert_eq!(manager.max_concurrent, HARD_CAP);
    }

    #[test]
    fn poll_all_reaps_exited_children_without_blocking() {
        let manager = echo_manager(DEFAULT_MAX);
        let id = manager.spawn("quick task", None, None).unwrap();

        let reached = wait_until(Duration::from_secs(2), || {
            manager.poll_all();
            let config = default_approval_config();
            manager.get_status(&id, false, &config).unwrap().status != Status::Running
        });
        assert!(reached, "subagent never reached a terminal state");
    }

    #[test]
    fn get_status_no_wait_returns_running_snapshot_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let script = sleepy_script_path(&dir, 5);
        let manager = SubagentManager::new(script, DEFAULT_MAX, "parent-1");
        let id = manager.spawn("long task", None, None).unwrap();

        let config = default_approval_config();
        let snapshot = manager.get_status(&id, false, &config).unwrap();
        assert_eq!(snapshot.status, Status::Running);

        manager.shutdown();
    }

    #[test]
    fn shutdown_terminates_still_running_subagents() {
        let dir = tempfile::tempdir().unwrap();
        let script = sleepy_script_path(&dir, 30);
        let manager = SubagentManager::new(script, DEFAULT_MAX, "parent-1");
        let id = manager.spawn("long task", None, None).unwrap();

        manager.shutdown();

        let config = default_approval_config();
        let snapshot = manager.get_status(&id, false, &config).unwrap();
        assert_ne!(snapshot.status, Status::Running);
    }

    #[test]
    fn get_status_unknown_id_is_not_found() {
        let manager = echo_manager(DEFAULT_MAX);
        let config = default_approval_config();
        let err = manager.get_status("does-not-exist", false, &config).unwrap_err();
        assert!(matches!(err, SubagentError::NotFound(_)));
    }

    #[test]
    fn running_count_reflects_active_subagents() {
        let dir = tempfile::tempdir().unwrap();
        let script = sleepy_script_path(&dir, 10);
        let manager = SubagentManager::new(script, DEFAULT_MAX, "parent-1");
        assert_eq!(manager.running_count(), 0);

        manager.spawn("long task", None, None).unwrap();
        assert_eq!(manager.running_count(), 1);

        manager.shutdown();
    }
}
