//! Post-merge sanity checks on a deserialized [`Config`].

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Mirrors `ralph_subagent::manager::HARD_CAP`; duplicated here rather
/// than pulled in as a dependency since this crate has no other reason to
/// depend on the subagent supervisor.
const MAX_SUBAGENT_POOL: usize = 32;

/// Validates a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_model(config)?;
    validate_runtime(config)?;
    validate_subagents(config)?;
    Ok(())
}

fn field_error(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation { field: field.to_string(), message: message.into() }
}

fn validate_model(config: &Config) -> ConfigResult<()> {
    let m = &config.model;
    if m.model.trim().is_empty() {
        return Err(field_error("model.model", "must not be empty"));
    }
    if m.max_tokens == 0 {
        return Err(field_error("model.max_tokens", "must be greater than zero"));
    }
    if !(0.0..=2.0).contains(&m.temperature) {
        return Err(field_error("model.temperature", format!("{} is out of range 0.0..=2.0", m.temperature)));
    }
    Ok(())
}

fn validate_runtime(config: &Config) -> ConfigResult<()> {
    let r = &config.runtime;
    if r.context_window_tokens == 0 {
        return Err(field_error("runtime.context_window_tokens", "must be greater than zero"));
    }
    if r.response_reserve_tokens >= r.context_window_tokens {
        return Err(field_error(
            "runtime.response_reserve_tokens",
            "must be smaller than context_window_tokens, or no budget would ever be available",
        ));
    }
    Ok(())
}

fn validate_subagents(config: &Config) -> ConfigResult<()> {
    let s = &config.subagents;
    if s.max_concurrent == 0 {
        return Err(field_error("subagents.max_concurrent", "must be greater than zero"));
    }
    if s.max_concurrent > MAX_SUBAGENT_POOL {
        return Err(field_error("subagents.max_concurrent", "exceeds the supervisor's hard cap of 32"));
    }
    if s.default_timeout_secs == 0 || s.default_timeout_secs > s.max_timeout_secs {
        return Err(field_error(
            "subagents.default_timeout_secs",
            "must be nonzero and no greater than max_timeout_secs",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let mut config = Config::default();
        config.model.max_tokens = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn reserve_exceeding_context_window_is_rejected() {
        let mut config = Config::default();
        config.runtime.response_reserve_tokens = config.runtime.context_window_tokens;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn oversized_subagent_pool_is_rejected() {
        let mut config = Config::default();
        config.subagents.max_concurrent = 64;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn default_timeout_exceeding_max_is_rejected() {
        let mut config = Config::default();
        config.subagents.default_timeout_secs = config.subagents.max_timeout_secs + 1;
        assert!(validate(&config).is_err());
    }
}
