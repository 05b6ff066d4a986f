//! Configuration file loader.

use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use super::types::ProxyConfig;
use super::validation::Validator;

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be read, contains
    /// malformed JSON, or fails validation.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ProxyConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<ProxyConfig> {
        let config: ProxyConfig = serde_json::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration against all registered validators.
    fn validate(&self, config: &ProxyConfig) -> ConfigResult<()> {
        for validator in &self.validators {
            let result = validator.validate(config);
            if !result.is_valid() {
                let errors: Vec<String> = result.errors().iter().map(ToString::to_string).collect();
                return Err(ConfigError::ValidationError(errors.join("; ")));
            }
        }
        Ok(())
    }
}
