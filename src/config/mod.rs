//! Configuration module
//!
//! Handles loading the bridge configuration and building the validated
//! subscriber mapping.

mod settings;

pub use settings::{Config, ConfigError, ConnectionConfig, ServerConfig, SubscriberMap};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
