//! Bridge settings loaded from a TOML file and the validated subscriber
//! mapping built from them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        /// Path that was attempted
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid TOML or is missing a required key
    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two aliases map to the same device port
    #[error("Device port {port} is mapped by both {first} and {second}")]
    DuplicatePort {
        /// The doubly-mapped device port
        port: String,
        /// First alias claiming the port
        first: String,
        /// Second alias claiming the port
        second: String,
    },

    /// The subscriber table is empty
    #[error("No subscribers configured")]
    NoSubscribers,
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network listener settings
    pub server: ServerConfig,
    /// Serial link settings
    pub connection: ConnectionConfig,
    /// Web alias -> device port mapping
    pub subscribers: BTreeMap<String, String>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// Any problem here is startup-fatal: a missing file, a missing key,
    /// or an inconsistent subscriber table all fail the load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        // Fail fast on an inconsistent mapping
        SubscriberMap::new(&config.subscribers)?;
        Ok(config)
    }
}

/// Network listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port number to bind
    pub port: u16,
}

/// Serial link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Device path (e.g. /dev/ttyUSB0, COM3)
    pub serial: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Deadline for a correlated command response, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Deadline for the ready announcement after a reset, in milliseconds
    #[serde(default = "default_reboot_timeout_ms")]
    pub reboot_timeout_ms: u64,
}

fn default_baud() -> u32 {
    115_200
}

fn default_command_timeout_ms() -> u64 {
    2_000
}

fn default_reboot_timeout_ms() -> u64 {
    5_000
}

impl ConnectionConfig {
    /// Command response deadline
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Reset handshake deadline
    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_millis(self.reboot_timeout_ms)
    }
}

/// Immutable bidirectional alias <-> device port mapping.
///
/// Built once at startup from the `[subscribers]` table and never mutated;
/// both lookup directions are O(1)-ish (hash map reverse, ordered forward).
/// Aliases are unique by TOML table construction; port uniqueness is
/// enforced here.
#[derive(Debug, Clone)]
pub struct SubscriberMap {
    forward: BTreeMap<String, String>,
    reverse: HashMap<String, String>,
}

impl SubscriberMap {
    /// Build the mapping, rejecting duplicate device ports.
    pub fn new(subscribers: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if subscribers.is_empty() {
            return Err(ConfigError::NoSubscribers);
        }

        let mut reverse: HashMap<String, String> = HashMap::with_capacity(subscribers.len());
        for (alias, port) in subscribers {
            if let Some(existing) = reverse.insert(port.clone(), alias.clone()) {
                return Err(ConfigError::DuplicatePort {
                    port: port.clone(),
                    first: existing,
                    second: alias.clone(),
                });
            }
        }

        Ok(Self {
            forward: subscribers.clone(),
            reverse,
        })
    }

    /// Device port for a web alias
    pub fn port_for(&self, alias: &str) -> Option<&str> {
        self.forward.get(alias).map(String::as_str)
    }

    /// Web alias for a device port
    pub fn alias_for(&self, port: &str) -> Option<&str> {
        self.reverse.get(port).map(String::as_str)
    }

    /// Configured device ports, in deterministic (alias) order
    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.forward.values().map(String::as_str)
    }

    /// Number of configured subscribers
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
