//! Configuration validation system.

use std::collections::{HashMap, HashSet};

use super::error::{ConfigError, ConfigResult};
use super::types::ProxyConfig;

/// Split an upstream address into host and port.
///
/// Accepts `host:port` with an optional bracketed IPv6 host. Hostnames are
/// allowed; resolution happens at dial time.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] if the address has no port, an
/// empty host, or a port outside 1..65535.
pub fn parse_host_port(address: &str) -> ConfigResult<(&str, u16)> {
    let invalid = |message: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    };

    let (host, port_str) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let port: u16 = port_str.parse().map_err(|_| invalid("invalid port"))?;
    if port == 0 {
        return Err(invalid("port must be 1..65535"));
    }

    Ok((host, port))
}

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &ProxyConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &ProxyConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.apps.is_empty() {
            result.add_error(ValidationError::new("apps", "no applications configured"));
        }

        let mut seen_names = HashSet::new();
        for app in &config.apps {
            if app.name.is_empty() {
                result.add_error(ValidationError::new(
                    "apps[].name",
                    "application name cannot be empty",
                ));
            }
            if !seen_names.insert(&app.name) {
                result.add_error(ValidationError::new(
                    format!("apps.{}", app.name),
                    format!("duplicate application name: {}", app.name),
                ));
            }

            if app.frontends.is_empty() {
                result.add_error(ValidationError::new(
                    format!("apps.{}.frontends", app.name),
                    "application needs at least one frontend",
                ));
            }
            if app.backends.is_empty() {
                result.add_error(ValidationError::new(
                    format!("apps.{}.backends", app.name),
                    "application needs at least one backend",
                ));
            }

            for frontend in &app.frontends {
                if frontend.port == 0 {
                    result.add_error(ValidationError::new(
                        format!("apps.{}.frontends[].port", app.name),
                        "port must be 1..65535",
                    ));
                }
            }

            for backend in &app.backends {
                if let Err(e) = parse_host_port(&backend.address) {
                    result.add_error(ValidationError::new(
                        format!("apps.{}.backends[].address", app.name),
                        e.to_string(),
                    ));
                }
            }
        }

        result
    }
}

/// Validator that checks for listening-port conflicts across applications.
#[derive(Debug, Default)]
pub struct PortConflictValidator;

impl PortConflictValidator {
    /// Create a new port conflict validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for PortConflictValidator {
    fn validate(&self, config: &ProxyConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut used_ports: HashMap<u16, String> = HashMap::new();

        for app in &config.apps {
            for frontend in &app.frontends {
                let field = format!("apps.{}.frontends[].port", app.name);
                if let Some(existing) = used_ports.get(&frontend.port) {
                    result.add_error(ValidationError::new(
                        field,
                        format!("port {} conflicts with {}", frontend.port, existing),
                    ));
                } else {
                    used_ports.insert(frontend.port, field);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn valid_config() -> ProxyConfig {
        ProxyConfig {
            apps: vec![AppConfig::new("web")
                .with_frontend(7000)
                .with_backend("127.0.0.1:9000")],
        }
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("127.0.0.1:9000").unwrap(), ("127.0.0.1", 9000));
        assert_eq!(parse_host_port("db.internal:5432").unwrap(), ("db.internal", 5432));
        assert_eq!(parse_host_port("[::1]:80").unwrap(), ("::1", 80));
    }

    #[test]
    fn test_parse_host_port_rejects_malformed() {
        assert!(parse_host_port("localhost").is_err());
        assert!(parse_host_port(":9000").is_err());
        assert!(parse_host_port("host:").is_err());
        assert!(parse_host_port("host:0").is_err());
        assert!(parse_host_port("host:notaport").is_err());
        assert!(parse_host_port("host:70000").is_err());
    }

    #[test]
    fn test_basic_validator_valid() {
        let validator = BasicValidator::new();
        assert!(validator.validate(&valid_config()).is_valid());
    }

    #[test]
    fn test_basic_validator_empty_config() {
        let validator = BasicValidator::new();
        let result = validator.validate(&ProxyConfig::default());
        assert!(!result.is_valid());
    }

    #[test]
    fn test_basic_validator_duplicate_app_names() {
        let mut config = valid_config();
        config.apps.push(
            AppConfig::new("web")
                .with_frontend(7001)
                .with_backend("127.0.0.1:9001"),
        );

        let validator = BasicValidator::new();
        let result = validator.validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("duplicate"));
    }

    #[test]
    fn test_basic_validator_missing_backends() {
        let config = ProxyConfig {
            apps: vec![AppConfig::new("web").with_frontend(7000)],
        };

        let validator = BasicValidator::new();
        let result = validator.validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("at least one backend"));
    }

    #[test]
    fn test_basic_validator_bad_backend_address() {
        let config = ProxyConfig {
            apps: vec![AppConfig::new("web")
                .with_frontend(7000)
                .with_backend("no-port-here")],
        };

        let validator = BasicValidator::new();
        assert!(!validator.validate(&config).is_valid());
    }

    #[test]
    fn test_port_conflict_within_app() {
        let config = ProxyConfig {
            apps: vec![AppConfig::new("web")
                .with_frontend(7000)
                .with_frontend(7000)
                .with_backend("127.0.0.1:9000")],
        };

        let validator = PortConflictValidator::new();
        let result = validator.validate(&config);
        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("conflicts"));
    }

    #[test]
    fn test_port_conflict_across_apps() {
        let config = ProxyConfig {
            apps: vec![
                AppConfig::new("web")
                    .with_frontend(7000)
                    .with_backend("127.0.0.1:9000"),
                AppConfig::new("api")
                    .with_frontend(7000)
                    .with_backend("127.0.0.1:9001"),
            ],
        };

        let validator = PortConflictValidator::new();
        assert!(!validator.validate(&config).is_valid());
    }

    #[test]
    fn test_distinct_ports_pass() {
        let config = ProxyConfig {
            apps: vec![
                AppConfig::new("web")
                    .with_frontend(7000)
                    .with_backend("127.0.0.1:9000"),
                AppConfig::new("api")
                    .with_frontend(7001)
                    .with_backend("127.0.0.1:9001"),
            ],
        };

        let validator = PortConflictValidator::new();
        assert!(validator.validate(&config).is_valid());
    }

    #[test]
    fn test_validation_result_merge() {
        let mut result1 = ValidationResult::new();
        result1.add_error(ValidationError::new("field1", "error1"));

        let mut result2 = ValidationResult::new();
        result2.add_error(ValidationError::new("field2", "error2"));

        result1.merge(result2);
        assert_eq!(result1.errors().len(), 2);
    }
}
