//! # Configuration System
//!
//! JSON-based configuration for the proxy: parsing, type definitions, and a
//! pluggable validation pipeline run at load time.
//!
//! ## Example Configuration
//!
//! ```json
//! { "apps": [
//!     { "name": "web",
//!       "frontends": [ { "port": 7000 } ],
//!       "backends":  [ { "address": "10.0.0.1:9000" },
//!                      { "address": "10.0.0.2:9000" } ] }
//! ] }
//! ```
//!
//! Listening ports must be unique across the whole file; every backend
//! address must split as `host:port`.

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{AppConfig, BackendConfig, FrontendConfig, ProxyConfig};
pub use validation::{
    parse_host_port, BasicValidator, PortConflictValidator, ValidationError, ValidationResult,
    Validator,
};
