//! # Sercast Core Library
//!
//! Bridges a single bidirectional serial command channel to any number of
//! TCP subscribers, republishing device telemetry as newline-delimited JSON
//! events:
//!
//! - One serial device, addressed through a request/response command
//!   protocol (`P1.subscribe(0)` style commands, echo-correlated replies).
//! - Unsolicited `port=value` notification lines are resolved against a
//!   configured alias mapping and fanned out to every connected subscriber.
//! - Subscribers connect and disconnect freely; each one sees every event
//!   published after it joined, exactly once, in order. A slow or dead
//!   subscriber never stalls the others.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sercast_core::{Config, Service};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     Service::new(config).run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{Config, ConfigError, ConnectionConfig, ServerConfig, SubscriberMap};
pub use crate::core::broadcast::{BroadcastRegistry, Sink, SinkId};
pub use crate::core::channel::{ChannelConfig, ChannelError, Notification, SerialChannel};
pub use crate::core::dispatcher::Dispatcher;
pub use crate::core::event::Event;
pub use crate::core::server::EventServer;
pub use crate::core::service::{Service, ServiceError};
pub use crate::core::transport::{LineTransport, SerialLineTransport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
