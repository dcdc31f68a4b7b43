//! Configuration management for the visor server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use visor_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("visor.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use visor_domain::resolver::DEFAULT_OBJECT_TYPES;
use visor_domain::{DispatcherConfig, ResolverConfig};

/// Largest per-type page the listing may request.
pub const MAX_LISTING_PAGE_SIZE: u32 = 1000;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    /// Worker pool sizing
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Permission-filtered listing
    #[serde(default)]
    pub listing: ListingSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Caller authentication
    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

/// Dispatcher settings.
///
/// - `VISOR_DISPATCHER__WORKERS=8`
/// - `VISOR_DISPATCHER__QUEUE_CAPACITY=256`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DispatcherSettings {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait before submissions are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        DispatcherConfig::new(settings.workers, settings.queue_capacity)
    }
}

/// Listing settings.
///
/// # Example YAML Configuration
///
/// ```yaml
/// listing:
///   relation: can_view
///   object_types: [clients, groups, roles]
///   page_size: 50
///   fan_out_timeout_ms: 5000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ListingSettings {
    /// Relation the caller must hold on listed objects.
    #[serde(default = "default_relation")]
    pub relation: String,

    /// Listable object types, in output order.
    /// Environment variable: `VISOR_LISTING__OBJECT_TYPES=clients,groups`
    #[serde(default = "default_object_types")]
    pub object_types: Vec<String>,

    /// Page size of each per-type query.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Deadline for collecting fan-out results. Unset waits for the slowest type.
    #[serde(default)]
    pub fan_out_timeout_ms: Option<u64>,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            relation: default_relation(),
            object_types: default_object_types(),
            page_size: default_page_size(),
            fan_out_timeout_ms: None,
        }
    }
}

fn default_relation() -> String {
    "can_view".to_string()
}

fn default_object_types() -> Vec<String> {
    DEFAULT_OBJECT_TYPES.iter().map(|t| t.to_string()).collect()
}

fn default_page_size() -> u32 {
    100
}

impl From<&ListingSettings> for ResolverConfig {
    fn from(settings: &ListingSettings) -> Self {
        let config = ResolverConfig::default()
            .with_relation(settings.relation.clone())
            .with_known_types(settings.object_types.iter().cloned())
            .with_page_size(settings.page_size);
        match settings.fan_out_timeout_ms {
            Some(ms) => config.with_fan_out_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

/// Permission store settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "openfga"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// OpenFGA HTTP API base URL (required if backend is "openfga")
    pub api_url: Option<String>,

    /// OpenFGA store id (required if backend is "openfga")
    pub store_id: Option<String>,

    /// Authorization model to evaluate against
    pub authorization_model_id: Option<String>,

    /// Bearer token for the OpenFGA API
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            api_url: None,
            store_id: None,
            authorization_model_id: None,
            api_token: None,
            timeout_secs: default_storage_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_storage_timeout() -> u64 {
    10
}

/// Caller authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthSettings {
    /// "header" trusts an identity header set by a fronting proxy;
    /// "bearer" maps static bearer tokens to subjects.
    #[serde(default = "default_auth_mode")]
    pub mode: String,

    /// Header carrying the caller identity in "header" mode.
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// Bearer token to subject, used in "bearer" mode.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            header: default_auth_header(),
            tokens: HashMap::new(),
        }
    }
}

fn default_auth_mode() -> String {
    "header".to_string()
}

fn default_auth_header() -> String {
    "x-user-id".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// `VISOR_SERVER__PORT` -> `server.port`; lists are comma separated.
fn env_source() -> Environment {
    Environment::with_prefix("VISOR")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("listing.object_types")
        .try_parsing(true)
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `VISOR_` and use `__` as separator.
    /// For example:
    /// - `VISOR_SERVER__PORT=9090` overrides `server.port`
    /// - `VISOR_STORAGE__API_URL=...` overrides `storage.api_url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.dispatcher.workers == 0 {
            return Err(invalid("dispatcher.workers must be greater than 0"));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(invalid("dispatcher.queue_capacity must be greater than 0"));
        }

        if self.listing.relation.trim().is_empty() {
            return Err(invalid("listing.relation cannot be empty"));
        }
        if self.listing.object_types.is_empty() {
            return Err(invalid("listing.object_types cannot be empty"));
        }
        if let Some(t) = self
            .listing
            .object_types
            .iter()
            .find(|t| t.is_empty() || t.contains(':') || t.contains(char::is_whitespace))
        {
            return Err(invalid(format!("listing.object_types has invalid type '{t}'")));
        }
        if self.dispatcher.queue_capacity < self.listing.object_types.len() {
            return Err(invalid(format!(
                "dispatcher.queue_capacity ({}) must hold one job per listed object type ({})",
                self.dispatcher.queue_capacity,
                self.listing.object_types.len()
            )));
        }
        if !(1..=MAX_LISTING_PAGE_SIZE).contains(&self.listing.page_size) {
            return Err(invalid(format!(
                "listing.page_size must be between 1 and {MAX_LISTING_PAGE_SIZE}, got: {}",
                self.listing.page_size
            )));
        }
        if self.listing.fan_out_timeout_ms == Some(0) {
            return Err(invalid("listing.fan_out_timeout_ms must be greater than 0"));
        }

        let valid_backends = ["memory", "openfga"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }
        if self.storage.backend == "openfga" {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing(&self.storage.api_url) {
                return Err(invalid(
                    "storage.api_url is required when backend is 'openfga'",
                ));
            }
            if missing(&self.storage.store_id) {
                return Err(invalid(
                    "storage.store_id is required when backend is 'openfga'",
                ));
            }
        }

        match self.auth.mode.as_str() {
            "header" if self.auth.header.trim().is_empty() => {
                return Err(invalid("auth.header cannot be empty in 'header' mode"));
            }
            "bearer" if self.auth.tokens.is_empty() => {
                return Err(invalid("auth.tokens cannot be empty in 'bearer' mode"));
            }
            "header" | "bearer" => {}
            other => {
                return Err(invalid(format!(
                    "auth.mode must be one of: [\"header\", \"bearer\"], got: {other}"
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::from(&self.dispatcher)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::from(&self.listing)
    }
}
