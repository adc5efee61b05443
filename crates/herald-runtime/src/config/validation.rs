//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DispatchConfig, FilterConfig, HeraldConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_filter_config(&config.filters)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter target: {target:?}"
        )));
    }

    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.idle_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "dispatch.idle_timeout_secs must be greater than 0",
        ));
    }

    if dispatch.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "dispatch.sweep_interval_secs must be greater than 0",
        ));
    }

    if dispatch.help_label.trim().is_empty() {
        return Err(ConfigError::validation("dispatch.help_label cannot be empty"));
    }

    if dispatch.help_label.contains(char::is_whitespace) {
        return Err(ConfigError::validation(
            "dispatch.help_label cannot contain whitespace",
        ));
    }

    Ok(())
}

fn validate_filter_config(filters: &FilterConfig) -> ConfigResult<()> {
    let rate_limit = &filters.rate_limit;
    if !rate_limit.enabled {
        return Ok(());
    }

    if rate_limit.max_events == 0 {
        return Err(ConfigError::validation(
            "filters.rate_limit.max_events must be greater than 0",
        ));
    }

    if rate_limit.window_ms == 0 {
        return Err(ConfigError::validation(
            "filters.rate_limit.window_ms must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = HeraldConfig::default();
        config.dispatch.idle_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = HeraldConfig::default();
        config.dispatch.sweep_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_help_label() {
        let mut config = HeraldConfig::default();
        config.dispatch.help_label = "  ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.dispatch.help_label = "show help".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rate_limit_only_when_enabled() {
        let mut config = HeraldConfig::default();
        config.filters.rate_limit.max_events = 0;
        assert!(validate_config(&config).is_ok());

        config.filters.rate_limit.enabled = true;
        assert!(validate_config(&config).is_err());

        config.filters.rate_limit.max_events = 3;
        config.filters.rate_limit.window_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = HeraldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("logs/herald.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
