use std::collections::HashSet;
use std::sync::Mutex;

/// Per-session orchestration state shared (by reference) into the batch
/// executor: the session-lifetime set of already-executed tool-call ids,
/// and the per-batch "have we spawned a subagent yet" flag (spec.md §4.3).
///
/// The spec describes `mark_executed` as `ok|err` to account for an
/// allocation failure; Rust's global allocator aborts the process on OOM
/// rather than returning an error here, so that branch is unreachable in
/// practice and `mark_executed` is infallible (see DESIGN.md).
pub struct OrchestrationContext {
    executed_ids: Mutex<HashSet<String>>,
    subagent_spawned_this_batch: Mutex<bool>,
}

impl OrchestrationContext {
    /// Builds a fresh context for one session; `executed_ids` starts empty.
    pub fn new() -> Self {
        Self {
            executed_ids: Mutex::new(HashSet::new()),
            subagent_spawned_this_batch: Mutex::new(false),
        }
    }

    /// Membership test on `executed_ids`.
    pub fn is_duplicate(&self, id: &str) -> bool {
        self.executed_ids.lock().expect("executed_ids mutex poisoned").contains(id)
    }

    /// Inserts `id` into `executed_ids`. Idempotent: inserting an id
    /// already present is a no-op.
    pub fn mark_executed(&self, id: &str) {
        self.executed_ids.lock().expect("executed_ids mutex poisoned").insert(id.to_string());
    }

    /// `name != "subagent"` always returns true. For `"subagent"`, returns
    /// whether a subagent has *not yet* been spawned this batch, and if
    /// so, claims the flag so a second call in the same batch is refused.
    pub fn can_spawn_subagent(&self, name: &str) -> bool {
        if name != "subagent" {
            return true;
        }
        let mut spawned = self.subagent_spawned_this_batch.lock().expect("subagent flag mutex poisoned");
        if *spawned {
            false
        } else {
            *spawned = true;
            true
        }
    }

    /// Clears the per-batch subagent flag. Called at the top of every
    /// iteration of the outer loop; never touches `executed_ids`.
    pub fn reset_batch(&self) {
        *self.subagent_spawned_this_batch.lock().expect("subagent flag mutex poisoned") = false;
    }
}

impl Default for OrchestrationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_detected_after_marking() {
        let ctx = OrchestrationContext::new();
        assert!(!ctx.is_duplicate("x1"));
        ctx.mark_executed("x1");
        assert!(ctx.is_duplicate("x1"));
    }

    #[test]
    fn only_one_subagent_spawn_allowed_per_batch() {
        let ctx = OrchestrationContext::new();
        assert!(ctx.can_spawn_subagent("subagent"));
        assert!(!ctx.can_spawn_subagent("subagent"));
        assert!(ctx.can_spawn_subagent("read_file"));
    }

    #[test]
    fn reset_batch_clears_subagent_flag_but_not_executed_ids() {
        let ctx = OrchestrationContext::new();
        ctx.mark_executed("x1");
        ctx.can_spawn_subagent("subagent");
        ctx.reset_batch();
        assert!(ctx.can_spawn_subagent("subagent"));
        assert!(ctx.is_duplicate("x1"));
    }
}
