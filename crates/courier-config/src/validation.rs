// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: positive rates, jitter within `[0, 1]`, non-empty paths.

use courier_core::CourierError;

use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation rather than failing fast, so the operator sees
/// the whole list in one run.
pub fn validate_config(config: &CourierConfig) -> Result<(), CourierError> {
    let mut errors = Vec::new();

    if config.limits.max_messages_per_hour == 0 {
        errors.push("limits.max_messages_per_hour must be > 0".to_string());
    }

    if config.limits.max_cycles == 0 {
        errors.push("limits.max_cycles must be >= 1".to_string());
    }

    if !(0.0..=1.0).contains(&config.limits.delay_randomness) {
        errors.push(format!(
            "limits.delay_randomness must be between 0.0 and 1.0, got {}",
            config.limits.delay_randomness
        ));
    }

    if config.limits.cycle_delay_minutes < 0.0 {
        errors.push(format!(
            "limits.cycle_delay_minutes must be non-negative, got {}",
            config.limits.cycle_delay_minutes
        ));
    }

    for (name, value) in [
        ("timeouts.search_timeout", config.timeouts.search_timeout),
        ("timeouts.send_timeout", config.timeouts.send_timeout),
        (
            "timeouts.page_load_timeout",
            config.timeouts.page_load_timeout,
        ),
    ] {
        if value == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }

    if config.retry.max_attempts_before_block == 0 {
        errors.push("retry.max_attempts_before_block must be > 0".to_string());
    }

    if !(0.0..=100.0).contains(&config.proxy.chat_not_found_threshold) {
        errors.push(format!(
            "proxy.chat_not_found_threshold must be a percentage in 0..=100, got {}",
            config.proxy.chat_not_found_threshold
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.agent.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "agent.log_level must be one of {valid_levels:?}, got `{}`",
            config.agent.log_level
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CourierError::Config(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CourierConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut config = CourierConfig::default();
        config.limits.max_messages_per_hour = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_messages_per_hour"));
    }

    #[test]
    fn jitter_out_of_range_is_rejected() {
        let mut config = CourierConfig::default();
        config.limits.delay_randomness = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn all_violations_are_reported_together() {
        let mut config = CourierConfig::default();
        config.limits.max_messages_per_hour = 0;
        config.retry.max_attempts_before_block = 0;
        config.storage.database_path = "  ".to_string();
        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("max_messages_per_hour"));
        assert!(message.contains("max_attempts_before_block"));
        assert!(message.contains("database_path"));
    }

    #[test]
    fn bogus_log_level_is_rejected() {
        let mut config = CourierConfig::default();
        config.agent.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }
}
