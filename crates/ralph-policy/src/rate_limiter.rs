use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-tool denial state (spec.md §4.1's rate limiter).
#[derive(Debug, Clone, Copy)]
struct Entry {
    denial_count: u32,
    backoff_until: Option<Instant>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            denial_count: 0,
            backoff_until: None,
        }
    }
}

/// Tracks repeated denials per tool name and imposes exponential backoff
/// after the 3rd consecutive denial, so a tool the user keeps saying no to
/// stops re-prompting on every turn.
///
/// Policy (spec.md §4.1): ≤2 denials → no backoff. The 3rd and subsequent
/// denials → `backoff_until = now + min(5 * 2^(denial_count - 3), 600)`
/// seconds. Any approval of a tool resets its entry.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Builds an empty limiter.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records one denial of `tool_name`, updating its backoff window.
    pub fn record_denial(&self, tool_name: &str) {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let entry = entries.entry(tool_name.to_string()).or_default();
        entry.denial_count += 1;
        if entry.denial_count >= 3 {
            let exp = entry.denial_count - 3;
            let secs = (5u64.saturating_mul(1u64 << exp.min(32))).min(600);
            entry.backoff_until = Some(Instant::now() + Duration::from_secs(secs));
        }
    }

    /// Clears `tool_name`'s denial history. Called on any approval.
    pub fn reset(&self, tool_name: &str) {
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        entries.remove(tool_name);
    }

    /// Whether `tool_name` is currently within its backoff window.
    pub fn is_rate_limited(&self, tool_name: &str) -> bool {
        self.retry_after_secs(tool_name) > 0
    }

    /// Seconds remaining until `tool_name` exits backoff, or 0 if it is
    /// not currently rate-limited.
    pub fn retry_after_secs(&self, tool_name: &str) -> u64 {
        let entries = self.entries.lock().expect("rate limiter mutex poisoned");
        match entries.get(tool_name).and_then(|e| e.backoff_until) {
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    (until - now).as_secs().max(1)
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backoff_under_three_denials() {
        let limiter = RateLimiter::new();
        limiter.record_denial("shell");
        limiter.record_denial("shell");
        assert!(!limiter.is_rate_limited("shell"));
    }

    #[test]
    fn backoff_kicks_in_on_third_denial() {
        let limiter = RateLimiter::new();
        limiter.record_denial("shell");
        limiter.record_denial("shell");
        limiter.record_denial("shell");
        assert!(limiter.is_rate_limited("shell"));
        assert!(limiter.retry_after_secs("shell") <= 5);
    }

    #[test]
    fn reset_clears_backoff() {
        let limiter = RateLimiter::new();
        for _ in 0..4 {
            limiter.record_denial("shell");
        }
        assert!(limiter.is_rate_limited("shell"));
        limiter.reset("shell");
        assert!(!limiter.is_rate_limited("shell"));
    }

    #[test]
    fn backoff_grows_and_caps_at_600() {
        let limiter = RateLimiter::new();
        for _ in 0..20 {
            limiter.record_denial("shell");
        }
        assert!(limiter.retry_after_secs("shell") <= 600);
    }
}
