//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DispatchConfig, LogOutput, LoggingConfig, RoutingConfig, SessionConfig, SwitchboardConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_session_config(&config.session)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_routing_config(&config.routing)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }
    Ok(())
}

fn validate_session_config(session: &SessionConfig) -> ConfigResult<()> {
    if session.idle_timeout_secs == 0 {
        return Err(ConfigError::ZeroValue {
            field: "session.idle_timeout_secs",
        });
    }
    if session.sweep_interval_secs == 0 {
        return Err(ConfigError::ZeroValue {
            field: "session.sweep_interval_secs",
        });
    }
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.max_concurrency == 0 {
        return Err(ConfigError::ZeroValue {
            field: "dispatch.max_concurrency",
        });
    }

    if dispatch.handler_timeout_ms == Some(0) {
        return Err(ConfigError::ZeroValue {
            field: "dispatch.handler_timeout_ms",
        });
    }

    if dispatch.command_prefix.chars().count() > 1 {
        return Err(ConfigError::validation(format!(
            "Command prefix must be a single character, got '{}'",
            dispatch.command_prefix
        )));
    }

    Ok(())
}

fn validate_routing_config(routing: &RoutingConfig) -> ConfigResult<()> {
    if routing.path_separator.is_empty() {
        return Err(ConfigError::validation("routing.path_separator cannot be empty"));
    }
    Ok(())
}
