//! Configuration validation.
//!
//! Missing required configuration (no model key, no enabled transport)
//! is fatal at startup; everything else degrades to a warning.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.model.api_key.trim().is_empty() {
            result.add_error(ValidationError::new(
                "model.api_key",
                "No model API key configured",
            ));
        }

        if !config.transports.values().any(|t| t.enabled) {
            result.add_error(ValidationError::new(
                "transports",
                "No enabled transport configured",
            ));
        }

        if config.orchestrator.turn_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.turn_timeout_secs",
                "Turn timeout cannot be 0",
            ));
        }

        if config.orchestrator.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.max_attempts",
                "At least one attempt is required",
            ));
        }

        if config.scheduler.max_concurrency == 0 {
            result.add_error(ValidationError::new(
                "scheduler.max_concurrency",
                "Concurrency cap cannot be 0",
            ));
        }

        if config.heartbeat.min_interval_mins > config.heartbeat.interval_mins {
            result.add_warning(ValidationWarning::new(
                "heartbeat.min_interval_mins",
                "Minimum interval exceeds the heartbeat period; fires will be skipped",
            ));
        }

        if config.subagents.max_children_per_session > config.subagents.max_concurrent_total {
            result.add_warning(ValidationWarning::new(
                "subagents.max_children_per_session",
                "Per-session child limit exceeds the global concurrent total",
            ));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TransportConfig;

    fn usable_config() -> Config {
        let mut config = Config::default();
        config.model.api_key = "sk-test".into();
        config.transports.insert(
            "telegram".into(),
            TransportConfig {
                enabled: true,
                options: Default::default(),
            },
        );
        config
    }

    #[test]
    fn default_config_is_rejected() {
        let result = ConfigValidator::validate(&Config::default());
        assert!(!result.is_valid());
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"model.api_key"));
        assert!(paths.contains(&"transports"));
    }

    #[test]
    fn usable_config_passes() {
        let result = ConfigValidator::validate(&usable_config());
        assert!(result.is_valid(), "errors: {:?}", result.errors);
    }

    #[test]
    fn disabled_transport_does_not_count() {
        let mut config = usable_config();
        config.transports.get_mut("telegram").unwrap().enabled = false;
        let result = ConfigValidator::validate(&config);
        assert!(!result.is_valid());
    }

    #[test]
    fn tight_heartbeat_floor_warns() {
        let mut config = usable_config();
        config.heartbeat.min_interval_mins = 60;
        config.heartbeat.interval_mins = 30;
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }
}
