use std::time::Instant;

/// A subagent's lifecycle state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The child process is still running.
    Running,
    /// The child exited with status 0.
    Completed,
    /// The child exited non-zero, or a supervisor-side error occurred.
    Failed,
    /// The child was killed after exceeding its timeout.
    Timeout,
}

/// One spawned child agent process, owned by the `SubagentManager` from
/// spawn to final status (spec.md §3).
pub struct Subagent {
    /// 16-hex-char id, unique within this process's lifetime.
    pub id: String,
    /// The child's pid.
    pub pid: i32,
    /// Current lifecycle state.
    pub status: Status,
    /// The task text the subagent was spawned with.
    pub task: String,
    /// Optional extra context text.
    pub context: Option<String>,
    /// When the subagent was spawned, for timeout accounting.
    pub start_time: Instant,
    /// Captured stdout+stderr so far.
    pub output_buffer: Vec<u8>,
    /// Set once `status` becomes `Completed`: the captured output.
    pub result: Option<String>,
    /// Set once `status` becomes `Failed`/`Timeout`: a short diagnostic.
    pub error: Option<String>,
}

impl Subagent {
    pub(crate) fn new(id: String, pid: i32, task: String, context: Option<String>) -> Self {
        Self {
            id,
            pid,
            status: Status::Running,
            task,
            context,
            start_time: Instant::now(),
            output_buffer: Vec::new(),
            result: None,
            error: None,
        }
    }
}

/// Generates a 16-hex-char id from a process-local counter plus the
/// current time, unique enough within one supervisor's lifetime (ids are
/// never persisted or compared across processes).
pub(crate) fn generate_id(counter: u64) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}{:08x}", counter as u32, nanos)
}
