//! TOML Configuration File Support
//!
//! Node settings live in `$XDG_CONFIG_HOME/overlay/node.toml` (typically
//! `~/.config/overlay/node.toml`).
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the daemon)
//! 2. Environment variables (`OVERLAY_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [node]
//! identity = "02a1..."
//!
//! [routing]
//! timeout_secs = 60
//! log_route_trace = false
//! local_route_priority = 100
//! params_enabled = true
//!
//! [network]
//! link_route_priority = 50
//! event_capacity = 256
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::identity::Identity;
use crate::network::DEFAULT_LINK_ROUTE_PRIORITY;
use crate::router::DEFAULT_ROUTING_TIMEOUT;

/// Priority of the `(anyone, self) -> local services` route by default
pub const DEFAULT_LOCAL_ROUTE_PRIORITY: i32 = 100;

const ENV_IDENTITY: &str = "OVERLAY_IDENTITY";
const ENV_ROUTING_TIMEOUT: &str = "OVERLAY_ROUTING_TIMEOUT_SECS";
const ENV_LOG_ROUTE_TRACE: &str = "OVERLAY_LOG_ROUTE_TRACE";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line override
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Built-in defaults
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Configuration Sections
// =============================================================================

/// `[node]` section
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Node identity; generated at startup when absent
    pub identity: Option<Identity>,
}

/// `[routing]` section
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Routing ceiling per query, in seconds
    pub timeout_secs: u64,
    /// Log the per-candidate trace of failed queries
    pub log_route_trace: bool,
    /// Priority of the local services route
    pub local_route_priority: i32,
    /// Strip `?params` before matching local service names
    pub params_enabled: bool,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_ROUTING_TIMEOUT.as_secs(),
            log_route_trace: false,
            local_route_priority: DEFAULT_LOCAL_ROUTE_PRIORITY,
            params_enabled: true,
        }
    }
}

/// `[network]` section
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Priority of per-link routes
    pub link_route_priority: i32,
    /// Event queue buffer per subscriber
    pub event_capacity: usize,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            link_route_priority: DEFAULT_LINK_ROUTE_PRIORITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Complete node configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity settings
    pub node: NodeSection,
    /// Dispatch engine settings
    pub routing: RoutingSection,
    /// Link settings
    pub network: NetworkSection,
    /// Where the configuration was loaded from
    #[serde(skip, default = "default_source")]
    pub source: ConfigSource,
    /// File the configuration was read from, if any
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

fn default_source() -> ConfigSource {
    ConfigSource::Default
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            routing: RoutingSection::default(),
            network: NetworkSection::default(),
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl NodeConfig {
    /// Routing ceiling as a [`Duration`]
    #[must_use]
    pub fn routing_timeout(&self) -> Duration {
        Duration::from_secs(self.routing.timeout_secs)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routing.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "routing.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.network.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "network.event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/overlay/node.toml` or `None` if the config
/// directory cannot be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("overlay").join("node.toml"))
}

/// Load configuration from the default path and the environment
pub async fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref()).await
}

/// Load configuration from a specific path and the environment
///
/// A missing file is not an error (defaults are used); an unreadable or
/// malformed one is.
pub async fn load_config_from_path(path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    let mut config = NodeConfig::default();

    if let Some(config_path) = path {
        match tokio::fs::read_to_string(config_path).await {
            Ok(content) => {
                config = NodeConfig::from_toml(&content)?;
                config.source = ConfigSource::File;
                config.config_file_path = Some(config_path.to_path_buf());
                tracing::info!(path = %config_path.display(), "Loaded configuration from file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
            }
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                });
            }
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Apply `OVERLAY_*` overrides using `lookup` to read variables
pub fn apply_env_config<F>(config: &mut NodeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = false;

    if let Some(value) = lookup(ENV_IDENTITY) {
        let identity = value
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("{ENV_IDENTITY}: {e}")))?;
        config.node.identity = Some(identity);
        applied = true;
    }
    if let Some(value) = lookup(ENV_ROUTING_TIMEOUT) {
        config.routing.timeout_secs = value
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("{ENV_ROUTING_TIMEOUT}: {e}")))?;
        applied = true;
    }
    if let Some(value) = lookup(ENV_LOG_ROUTE_TRACE) {
        config.routing.log_route_trace = matches!(value.as_str(), "1" | "true" | "yes");
        applied = true;
    }

    if applied {
        config.source = ConfigSource::Env;
    }
    Ok(())
}
