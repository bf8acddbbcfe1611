use std::time::Duration;

use ralph_core::{
    read_frame, write_frame, ApprovalOutcome, ApprovalRequestFrame, ApprovalResponseFrame, ToolCall,
};

use crate::allowlist::{tokenize_shell_command, RegexAllowlistEntry, ShellAllowlistEntry, ShellFlavor};
use crate::category::{classify, Category};
use crate::config::{Action, ApprovalConfig, ApprovalResult, CheckOutcome};
use crate::error::PolicyError;
use crate::prompt::{prompt_tty, synthesize_pattern, SynthesizedPattern};

/// How long the child side of an approval proxy waits for the parent's
/// response before treating the pipe as broken. Not uniformly specified
/// in spec.md §9's open questions; 45s is chosen as "at least 30s but
/// finite" per that note (see DESIGN.md).
pub const APPROVAL_PROXY_TIMEOUT: Duration = Duration::from_secs(45);

/// Ties classification, allowlists, rate limiting, protected-file checks,
/// and interactive/proxied approval together into the single entry point
/// the batch executor calls per tool call (spec.md §4.1).
pub struct PolicyEngine<'a> {
    config: &'a ApprovalConfig,
}

impl<'a> PolicyEngine<'a> {
    /// Builds an engine over `config`.
    pub fn new(config: &'a ApprovalConfig) -> Self {
        Self { config }
    }

    /// Classifies `call.name` (spec.md §4.1's `classify`).
    pub fn classify(&self, call: &ToolCall) -> Category {
        classify(&call.name)
    }

    /// Decides one of `{Allow, Deny, RequiresPrompt, ProtectedFile,
    /// RateLimited}` for `call` (spec.md §4.1's `check`).
    pub fn check(&self, call: &ToolCall) -> CheckOutcome {
        if !self.config.enabled {
            return CheckOutcome::Allow;
        }

        let category = self.classify(call);
        let arguments = call.arguments_value();

        if category == Category::FileWrite {
            if let Some(path) = arguments.get("path").and_then(|v| v.as_str()) {
                if self.config.protected_files.is_protected(std::path::Path::new(path)) {
                    return CheckOutcome::ProtectedFile(path.to_string());
                }
            }
        }

        if category == Category::Shell {
            let command = arguments.get("command").and_then(|v| v.as_str()).unwrap_or_default();
            let tokens = tokenize_shell_command(command);
            if self
                .config
                .allowlist
                .lock()
                .expect("allowlist mutex poisoned")
                .matches_shell(&tokens, None)
            {
                return CheckOutcome::Allow;
            }
        } else if self
            .config
            .allowlist
            .lock()
            .expect("allowlist mutex poisoned")
            .matches_regex(&call.name, &call.arguments)
        {
            return CheckOutcome::Allow;
        }

        if self.config.rate_limiter.is_rate_limited(&call.name) {
            let retry_after_secs = self.config.rate_limiter.retry_after_secs(&call.name);
            tracing::warn!(tool = %call.name, retry_after_secs, "tool call rate-limited");
            return CheckOutcome::RateLimited(retry_after_secs);
        }

        match self.config.action_for(category) {
            Action::Allow => CheckOutcome::Allow,
            Action::Deny => {
                tracing::info!(tool = %call.name, ?category, "tool call denied by category policy");
                CheckOutcome::Deny
            }
            Action::Gate => CheckOutcome::RequiresPrompt,
        }
    }

    /// Runs the interactive (or proxied) approval path for a `Gate`
    /// decision (spec.md §4.1's `prompt`).
    pub fn prompt(&self, call: &ToolCall) -> Result<ApprovalResult, PolicyError> {
        self.prompt_with_pattern(call).map(|(result, _)| result)
    }

    /// Like [`Self::prompt`], but also returns the textual allowlist
    /// pattern installed on `AllowedAlways`, so a caller proxying this
    /// decision to a remote peer (the subagent supervisor, on behalf of
    /// a child) can forward the same pattern for the child to mirror.
    pub fn prompt_with_pattern(&self, call: &ToolCall) -> Result<(ApprovalResult, Option<String>), PolicyError> {
        let (result, pattern) = if let Some(channel) = &self.config.approval_channel {
            self.prompt_via_channel(call, channel)?
        } else {
            if !self.config.is_interactive {
                return Err(PolicyError::NonInteractiveGated);
            }
            (self.prompt_local(call)?, None)
        };

        tracing::info!(tool = %call.name, ?result, "approval decision");
        match result {
            ApprovalResult::Denied => self.config.rate_limiter.record_denial(&call.name),
            ApprovalResult::Allowed | ApprovalResult::AllowedAlways => {
                self.config.rate_limiter.reset(&call.name)
            }
            ApprovalResult::Aborted => {}
        }

        let pattern = if result == ApprovalResult::AllowedAlways && pattern.is_none() {
            Some(self.install_allowlist_pattern(call))
        } else {
            pattern
        };

        Ok((result, pattern))
    }

    fn prompt_local(&self, call: &ToolCall) -> Result<ApprovalResult, PolicyError> {
        let category = self.classify(call);
        let summary = format!("{:?}: {}", category, call.name);
        let details = &call.arguments;
        match prompt_tty(&call.name, &summary, details) {
            Ok(result) => Ok(result),
            Err(_) => Err(PolicyError::Aborted),
        }
    }

    fn prompt_via_channel(
        &self,
        call: &ToolCall,
        channel: &crate::config::ApprovalChannel,
    ) -> Result<(ApprovalResult, Option<String>), PolicyError> {
        let request_id = channel.next_id();
        let request = ApprovalRequestFrame {
            request_id,
            tool_name: call.name.clone(),
            arguments_json: call.arguments.clone(),
            display_summary: format!("{:?}: {}", self.classify(call), call.name),
        };

        {
            let mut writer = channel.request_writer();
            write_frame(&mut *writer, &request).map_err(|_| PolicyError::Aborted)?;
        }

        if !channel.wait_response_ready(APPROVAL_PROXY_TIMEOUT) {
            // The parent never answered within the bound; treat it the
            // same as a broken pipe rather than hang this call forever
            // (spec.md §4.2, §5: the response read must be bounded).
            tracing::warn!(tool = %call.name, "approval proxy timed out waiting on parent");
            return Ok((ApprovalResult::Denied, None));
        }

        let response: ApprovalResponseFrame = {
            let mut reader = channel.response_reader();
            read_frame(&mut *reader).map_err(|_| PolicyError::Aborted)?
        };
        if response.request_id != request_id {
            // A mismatched reply means the proxy protocol is out of sync;
            // treat it the same as a broken pipe (deny) rather than risk
            // applying a decision meant for a different call.
            return Ok((ApprovalResult::Denied, None));
        }

        if let (ApprovalOutcome::AllowedAlways, Some(pattern)) = (response.result, &response.pattern) {
            self.config
                .allowlist
                .lock()
                .expect("allowlist mutex poisoned")
                .add_regex(RegexAllowlistEntry::new(&call.name, pattern).unwrap_or_else(|_| {
                    RegexAllowlistEntry::new(&call.name, ".^").expect("unsatisfiable regex is valid")
                }));
        }

        let result = match response.result {
            ApprovalOutcome::Allowed => ApprovalResult::Allowed,
            ApprovalOutcome::AllowedAlways => ApprovalResult::AllowedAlways,
            ApprovalOutcome::Denied | ApprovalOutcome::RateLimited => ApprovalResult::Denied,
            ApprovalOutcome::Aborted => ApprovalResult::Aborted,
        };
        Ok((result, response.pattern))
    }

    /// Installs the synthesized `AllowedAlways` pattern and returns its
    /// textual form, so a proxying caller can forward it to the peer that
    /// requested the approval.
    fn install_allowlist_pattern(&self, call: &ToolCall) -> String {
        let category = self.classify(call);
        let arguments = call.arguments_value();
        match synthesize_pattern(category, &call.name, &arguments) {
            SynthesizedPattern::Regex { tool_name, pattern } => {
                if let Ok(entry) = RegexAllowlistEntry::new(tool_name, &pattern) {
                    self.config.allowlist.lock().expect("allowlist mutex poisoned").add_regex(entry);
                }
                pattern
            }
            SynthesizedPattern::Shell(entry) => {
                let text = entry.prefix_tokens.join(" ");
                self.config.allowlist.lock().expect("allowlist mutex poisoned").add_shell(entry);
                text
            }
        }
    }

    /// Convenience combining `check` and, when gated, `prompt`, into the
    /// single outcome the batch executor needs per call.
    pub fn check_and_prompt(&self, call: &ToolCall) -> Result<(), PolicyError> {
        match self.check(call) {
            CheckOutcome::Allow => Ok(()),
            CheckOutcome::Deny => Err(PolicyError::OperationDenied),
            CheckOutcome::ProtectedFile(path) => Err(PolicyError::ProtectedFile(path)),
            CheckOutcome::RateLimited(secs) => Err(PolicyError::RateLimited { retry_after_secs: secs }),
            CheckOutcome::RequiresPrompt => match self.prompt(call)? {
                ApprovalResult::Allowed | ApprovalResult::AllowedAlways => Ok(()),
                ApprovalResult::Denied => Err(PolicyError::OperationDenied),
                ApprovalResult::Aborted => Err(PolicyError::Aborted),
            },
        }
    }
}

/// Parses a `shell_flavor` string from config into the enum, used by the
/// `ralph-config` policy-file loader.
pub fn parse_shell_flavor(s: &str) -> Option<ShellFlavor> {
    match s {
        "posix" | "sh" | "bash" | "zsh" => Some(ShellFlavor::PosixShell),
        "cmd" => Some(ShellFlavor::Cmd),
        "powershell" | "pwsh" => Some(ShellFlavor::PowerShell),
        _ => None,
    }
}

/// Builds a `ShellAllowlistEntry` from a token list and optional flavor
/// string, used by the `ralph-config` policy-file loader.
pub fn shell_entry(tokens: Vec<String>, flavor: Option<&str>) -> ShellAllowlistEntry {
    ShellAllowlistEntry {
        prefix_tokens: tokens,
        shell_flavor: flavor.and_then(parse_shell_flavor),
    }
}
