//! Converts a loaded [`Config`]'s `[security.policy]` section into a
//! runtime [`ralph_policy::ApprovalConfig`].
//!
//! Kept in this crate rather than `ralph-policy` itself so `ralph-policy`
//! never has to know TOML exists — it only understands the typed
//! `Category`/`Action`/`Allowlist` API this module drives.

use std::path::PathBuf;

use ralph_policy::{shell_entry, Action, ApprovalConfig, Category, ProtectedFileCache, RegexAllowlistEntry};

use crate::types::{AllowlistEntryConfig, Config};

fn category_from_name(name: &str) -> Option<Category> {
    match name {
        "file_write" => Some(Category::FileWrite),
        "file_read" => Some(Category::FileRead),
        "shell" => Some(Category::Shell),
        "network" => Some(Category::Network),
        "memory" => Some(Category::Memory),
        "subagent" => Some(Category::Subagent),
        "mcp" => Some(Category::Mcp),
        "other" => Some(Category::Other),
        _ => None,
    }
}

fn action_from_name(name: &str) -> Option<Action> {
    match name {
        "allow" => Some(Action::Allow),
        "gate" => Some(Action::Gate),
        "deny" => Some(Action::Deny),
        _ => None,
    }
}

/// Builds a session [`ApprovalConfig`] from `config.security.policy`.
///
/// Unknown category or action names are logged as a warning and skipped
/// rather than aborting the load (spec.md §6) — a config written against
/// a newer build's category list should still start on an older one.
///
/// `extra_scan_roots` (typically the workspace root and `$HOME`) are
/// combined with `config.security.policy.protected_roots` to seed the
/// protected-file cache.
pub fn build_approval_config(config: &Config, is_interactive: bool, extra_scan_roots: &[PathBuf]) -> ApprovalConfig {
    let policy = &config.security.policy;

    let mut scan_roots: Vec<PathBuf> = extra_scan_roots.to_vec();
    scan_roots.extend(policy.protected_roots.iter().map(PathBuf::from));
    let protected_files = ProtectedFileCache::new(scan_roots);

    let mut approval = ApprovalConfig::new(is_interactive, protected_files);
    approval.enabled = policy.enabled;

    for (name, action_name) in &policy.categories {
        let (Some(category), Some(action)) = (category_from_name(name), action_from_name(action_name)) else {
            tracing::warn!(category = %name, action = %action_name, "skipping unrecognized security.policy.categories entry");
            continue;
        };
        approval.set_action(category, action);
    }

    {
        let mut allowlist = approval.allowlist.lock().expect("allowlist mutex poisoned");
        for entry in &policy.allowlist {
            match entry {
                AllowlistEntryConfig::Regex { tool, pattern } => match RegexAllowlistEntry::new(tool.clone(), pattern) {
                    Ok(entry) => allowlist.add_regex(entry),
                    Err(e) => tracing::warn!(tool = %tool, pattern = %pattern, error = %e, "skipping invalid allowlist regex"),
                },
                AllowlistEntryConfig::Shell { prefix, flavor } => {
                    allowlist.add_shell(shell_entry(prefix.clone(), flavor.as_deref()));
                }
            }
        }
    }

    approval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_name_is_skipped_not_fatal() {
        let mut config = Config::default();
        config.security.policy.categories.insert("not_a_real_category".to_string(), "deny".to_string());
        config.security.policy.categories.insert("shell".to_string(), "deny".to_string());

        let approval = build_approval_config(&config, true, &[]);
        assert_eq!(approval.action_for(Category::Shell), Action::Deny);
    }

    #[test]
    fn shell_allowlist_entry_is_installed() {
        let mut config = Config::default();
        config.security.policy.allowlist.push(AllowlistEntryConfig::Shell {
            prefix: vec!["git".to_string(), "status".to_string()],
            flavor: None,
        });

        let approval = build_approval_config(&config, true, &[]);
        let allowlist = approval.allowlist.lock().unwrap();
        assert!(allowlist.matches_shell(&["git".to_string(), "status".to_string()], None));
    }

    #[test]
    fn empty_categories_leave_defaults_in_place() {
        let config = Config::default();
        let approval = build_approval_config(&config, true, &[]);
        assert_eq!(approval.action_for(Category::FileRead), Action::Allow);
    }
}
