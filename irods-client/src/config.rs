//! Client environment configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. Environment file (if specified via IRODS_ENVIRONMENT_FILE)
//! 3. Environment variables
//!
//! The environment file is the usual `irods_environment.json`. It is read
//! with the YAML parser, which accepts JSON as well.

use crate::connection::{ConnectionConfig, Identity};
use crate::negotiation::NegotiationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Option value asking the server to negotiate security.
pub const REQUEST_NEGOTIATION: &str = "request_server_negotiation";

/// Client environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name.
    pub irods_host: String,
    /// Server port.
    pub irods_port: u16,
    /// User to connect as.
    pub irods_user_name: String,
    /// Zone of the user.
    pub irods_zone_name: String,
    /// `request_server_negotiation` to negotiate, anything else to skip.
    pub irods_client_server_negotiation: String,
    /// Local negotiation policy.
    pub irods_client_server_policy: NegotiationPolicy,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-operation I/O timeout in seconds; 0 disables it.
    pub io_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            irods_host: "localhost".to_string(),
            irods_port: irods_protocol::DEFAULT_PORT,
            irods_user_name: String::new(),
            irods_zone_name: String::new(),
            irods_client_server_negotiation: REQUEST_NEGOTIATION.to_string(),
            irods_client_server_policy: NegotiationPolicy::default(),
            connect_timeout_secs: 10,
            io_timeout_secs: 0,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the environment file, then applies
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("IRODS_ENVIRONMENT_FILE") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a JSON or YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("IRODS_HOST") {
            self.irods_host = host;
        }

        if let Some(port) = lookup("IRODS_PORT") {
            if let Ok(parsed) = port.trim().parse() {
                self.irods_port = parsed;
            }
        }

        if let Some(user) = lookup("IRODS_USER_NAME") {
            self.irods_user_name = user;
        }

        if let Some(zone) = lookup("IRODS_ZONE_NAME") {
            self.irods_zone_name = zone;
        }

        if let Some(negotiation) = lookup("IRODS_CLIENT_SERVER_NEGOTIATION") {
            self.irods_client_server_negotiation = negotiation;
        }

        if let Some(policy) = lookup("IRODS_CLIENT_SERVER_POLICY") {
            if let Ok(parsed) = policy.parse() {
                self.irods_client_server_policy = parsed;
            }
        }
    }

    /// Checks that the identity and address are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.irods_host.trim().is_empty() {
            return Err(ConfigError::ValidationError("irods_host is empty".into()));
        }
        if self.irods_port == 0 {
            return Err(ConfigError::ValidationError("irods_port is 0".into()));
        }
        self.identity()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.irods_user_name, &self.irods_zone_name)
    }

    pub fn requests_negotiation(&self) -> bool {
        self.irods_client_server_negotiation.trim() == REQUEST_NEGOTIATION
    }

    /// Builds the connection settings described by this environment.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.irods_host, self.irods_port, self.identity())
            .with_negotiation(self.requests_negotiation())
            .with_negotiation_policy(self.irods_client_server_policy)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));
        if self.io_timeout_secs > 0 {
            config = config.with_io_timeout(Duration::from_secs(self.io_timeout_secs));
        }
        config
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read environment file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse environment file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
