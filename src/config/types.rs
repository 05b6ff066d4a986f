//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure for the proxy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Applications (tenants) served by this process.
    pub apps: Vec<AppConfig>,
}

/// One application: a named bundle of frontends and backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name (used for identification and log correlation).
    pub name: String,

    /// Listening ports for this application.
    #[serde(default)]
    pub frontends: Vec<FrontendConfig>,

    /// Upstream endpoints for this application, in selection order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl AppConfig {
    /// Create a new application entry with no frontends or backends.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frontends: Vec::new(),
            backends: Vec::new(),
        }
    }

    /// Add a listening port.
    #[must_use]
    pub fn with_frontend(mut self, port: u16) -> Self {
        self.frontends.push(FrontendConfig { port });
        self
    }

    /// Add an upstream address.
    #[must_use]
    pub fn with_backend(mut self, address: &str) -> Self {
        self.backends.push(BackendConfig {
            address: address.to_string(),
        });
        self
    }
}

/// One listening port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// TCP port to listen on (1..65535).
    pub port: u16,
}

/// One upstream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Upstream address as `host:port`.
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_empty() {
        let config = ProxyConfig::default();
        assert!(config.apps.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{ "apps": [] }"#;
        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert!(config.apps.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"
            { "apps": [
                { "name": "web",
                  "frontends": [ { "port": 7000 }, { "port": 7001 } ],
                  "backends":  [ { "address": "127.0.0.1:9000" },
                                 { "address": "10.0.0.2:9000" } ] }
            ] }
        "#;

        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.apps.len(), 1);
        assert_eq!(config.apps[0].name, "web");
        assert_eq!(config.apps[0].frontends.len(), 2);
        assert_eq!(config.apps[0].frontends[1].port, 7001);
        assert_eq!(config.apps[0].backends[0].address, "127.0.0.1:9000");
    }

    #[test]
    fn test_parse_rejects_out_of_range_port() {
        let json = r#"
            { "apps": [
                { "name": "web",
                  "frontends": [ { "port": 70000 } ],
                  "backends":  [ { "address": "127.0.0.1:9000" } ] }
            ] }
        "#;

        assert!(serde_json::from_str::<ProxyConfig>(json).is_err());
    }

    #[test]
    fn test_app_config_builder() {
        let app = AppConfig::new("db")
            .with_frontend(5432)
            .with_backend("10.0.0.1:5432");

        assert_eq!(app.name, "db");
        assert_eq!(app.frontends[0].port, 5432);
        assert_eq!(app.backends[0].address, "10.0.0.1:5432");
    }
}
