//! Post-load configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_turn(config)?;
    validate_limits(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    if config.server.event_buffer == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.event_buffer".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }
    Ok(())
}

/// Smallest context budget that can still hold a system prompt.
const MIN_CONTEXT_BUDGET: usize = 512;

fn validate_turn(config: &Config) -> ConfigResult<()> {
    let t = &config.turn;

    if t.context_budget < MIN_CONTEXT_BUDGET {
        return Err(ConfigError::ValidationError {
            field: "turn.context_budget".to_owned(),
            message: format!("must be at least {MIN_CONTEXT_BUDGET} tokens"),
        });
    }

    if t.max_iterations == 0 {
        return Err(ConfigError::ValidationError {
            field: "turn.max_iterations".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }

    if t.llm_timeout_secs == 0 || t.mcp_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "turn.llm_timeout_secs".to_owned(),
            message: "timeouts must be non-zero".to_owned(),
        });
    }

    Ok(())
}

fn validate_limits(config: &Config) -> ConfigResult<()> {
    let l = &config.limits;

    if l.prompts_per_hour == 0 || l.prompts_per_day == 0 {
        return Err(ConfigError::ValidationError {
            field: "limits.prompts_per_hour".to_owned(),
            message: "rate limits must be non-zero".to_owned(),
        });
    }

    if l.prompts_per_hour > l.prompts_per_day {
        return Err(ConfigError::ValidationError {
            field: "limits.prompts_per_day".to_owned(),
            message: "daily limit must be >= hourly limit".to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_tiny_budget_rejected() {
        let mut config = Config::default();
        config.turn.context_budget = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_inverted_rate_limits_rejected() {
        let mut config = Config::default();
        config.limits.prompts_per_hour = 500;
        config.limits.prompts_per_day = 100;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut config = Config::default();
        config.turn.max_iterations = 0;
        assert!(validate(&config).is_err());
    }
}
