//! Configuration loader.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.scheduler.max_concurrency, 3);
        assert!(config.model.api_key.is_empty());
    }

    #[test]
    fn env_vars_expand() {
        // Safety: test-local variable name, no concurrent reader cares.
        unsafe { std::env::set_var("ADJUTANT_TEST_KEY", "sk-test") };
        let config = ConfigLoader::load_str("[model]\napi_key = \"${ADJUTANT_TEST_KEY}\"").unwrap();
        assert_eq!(config.model.api_key, "sk-test");
    }

    #[test]
    fn missing_env_var_errors() {
        let result = ConfigLoader::load_str("[model]\napi_key = \"${ADJUTANT_DEFINITELY_UNSET}\"");
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn transports_parse() {
        let toml = r#"
[transports.telegram]
enabled = true

[transports.telegram.options]
token = "abc"
"#;
        let config = ConfigLoader::load_str(toml).unwrap();
        assert!(config.transports["telegram"].enabled);
    }
}
