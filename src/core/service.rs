//! Service orchestration
//!
//! Wires the pieces together: configuration → subscriber map → serial
//! command channel → device reset → startup subscriptions → TCP listener →
//! dispatcher loop. Runs until the serial link fails (error) or shutdown is
//! requested through the cancellation token (clean exit).

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::broadcast::BroadcastRegistry;
use super::channel::{ChannelConfig, ChannelError, SerialChannel};
use super::dispatcher::Dispatcher;
use super::server::EventServer;
use super::transport::{LineTransport, SerialLineTransport, TransportError};
use crate::config::{Config, ConfigError, SubscriberMap};

/// Service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serial device could not be opened or failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Event server could not bind its listener
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was attempted
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serial command channel failed
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// The running bridge process.
pub struct Service {
    config: Config,
}

impl Service {
    /// Create a service from a loaded configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open the configured serial device and run until the link fails or
    /// `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServiceError> {
        let connection = &self.config.connection;
        let transport = SerialLineTransport::open(&connection.serial, connection.baud)?;
        info!(device = %connection.serial, baud = connection.baud, "Serial link open");
        self.run_with_transport(Box::new(transport), cancel).await
    }

    /// Run over an arbitrary line transport.
    ///
    /// This is `run` minus the device open, and is what tests drive with
    /// the in-memory transport.
    pub async fn run_with_transport(
        self,
        transport: Box<dyn LineTransport>,
        cancel: CancellationToken,
    ) -> Result<(), ServiceError> {
        let map = SubscriberMap::new(&self.config.subscribers)?;
        let registry = BroadcastRegistry::new();

        let server = EventServer::new(registry.clone());
        let (addr, server_task) = server
            .bind(
                &self.config.server.host,
                self.config.server.port,
                cancel.clone(),
            )
            .await
            .map_err(|source| ServiceError::Bind {
                addr: format!(
                    "{}:{}",
                    self.config.server.host, self.config.server.port
                ),
                source,
            })?;
        info!(%addr, "Listening for subscribers");

        let channel_config = ChannelConfig {
            command_timeout: self.config.connection.command_timeout(),
            reboot_timeout: self.config.connection.reboot_timeout(),
        };
        let (channel, notifications) = SerialChannel::start(transport, channel_config);

        let result = async {
            // Best effort: some devices come up without acknowledging a reset
            match channel.try_reboot().await {
                Ok(()) => info!("Device reset complete"),
                Err(e) => warn!("Device reset not acknowledged: {e}"),
            }

            subscribe_all(&channel, &map).await?;
            info!(ports = map.len(), "Startup subscriptions done");

            Dispatcher::new(map, registry)
                .run(notifications, cancel.clone())
                .await
                .map_err(ServiceError::from)
        }
        .await;

        // Tear down the listener and all sessions before reporting,
        // whichever way the run ended
        cancel.cancel();
        let _ = server_task.await;
        result
    }
}

/// Issue a subscribe command for every configured port.
///
/// A subscription that times out is logged and skipped — the remaining
/// ports are still subscribed. Transport loss aborts startup.
async fn subscribe_all(channel: &SerialChannel, map: &SubscriberMap) -> Result<(), ServiceError> {
    for port in map.ports() {
        match channel.subscribe(port).await {
            Ok(response) => debug!(%port, %response, "Subscribed"),
            Err(e @ ChannelError::CommandTimeout(_)) => {
                warn!(%port, "Subscription not acknowledged: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{mock_pair, MockDevice};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn test_config(ports: &[(&str, &str)]) -> Config {
        let mut subscribers = BTreeMap::new();
        for (alias, port) in ports {
            subscribers.insert((*alias).to_string(), (*port).to_string());
        }
        Config {
            server: crate::config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            connection: crate::config::ConnectionConfig {
                serial: "/dev/null".to_string(),
                baud: 115_200,
                command_timeout_ms: 100,
                reboot_timeout_ms: 100,
            },
            subscribers,
        }
    }

    #[tokio::test]
    async fn starts_up_and_shuts_down_cleanly() {
        let (transport, mut device) = mock_pair();
        let cancel = CancellationToken::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        // Answer the full startup sequence, signal, then idle
        let device_task = tokio::spawn(async move {
            assert_eq!(device.recv_command().await.unwrap(), "reset()");
            device.inject("ready");
            for _ in 0..2 {
                let command = device.recv_command().await.unwrap();
                device.inject(&format!("{command}:ok"));
            }
            started_tx.send(()).unwrap();
            // Keep the link open until the service shuts down
            while device.recv_command().await.is_some() {}
        });

        let service = Service::new(test_config(&[("webalias1", "P1"), ("webalias2", "P2")]));
        let run = tokio::spawn(service.run_with_transport(Box::new(transport), cancel.clone()));

        // Shut down only once the device has seen all startup traffic
        started_rx.await.unwrap();
        cancel.cancel();

        run.await.unwrap().unwrap();
        device_task.await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_timeouts_do_not_abort_startup() {
        let (transport, mut device) = mock_pair();
        let cancel = CancellationToken::new();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();

        // Acknowledge the reset, swallow both subscribe commands without
        // ever answering, signal, then idle
        let device_task = tokio::spawn(async move {
            assert_eq!(device.recv_command().await.unwrap(), "reset()");
            device.inject("ready");
            assert_eq!(device.recv_command().await.unwrap(), "P1.subscribe(0)");
            assert_eq!(device.recv_command().await.unwrap(), "P2.subscribe(0)");
            seen_tx.send(()).unwrap();
            while device.recv_command().await.is_some() {}
        });

        let service = Service::new(test_config(&[("a", "P1"), ("b", "P2")]));
        let run = tokio::spawn(service.run_with_transport(Box::new(transport), cancel.clone()));

        // The second subscribe is only written after the first has timed
        // out, so by this point both timeouts were tolerated
        seen_rx.await.unwrap();
        cancel.cancel();

        run.await.unwrap().unwrap();
        device_task.await.unwrap();
    }

    #[tokio::test]
    async fn serial_loss_terminates_the_service_with_an_error() {
        let (transport, mut device) = mock_pair();
        let cancel = CancellationToken::new();

        let device_task = tokio::spawn(async move {
            // Answer startup, then die
            assert_eq!(device.recv_command().await.unwrap(), "reset()");
            device.inject("ready");
            let command = device.recv_command().await.unwrap();
            device.inject(&format!("{command}:ok"));
            drop(device);
        });

        let service = Service::new(test_config(&[("webalias1", "P1")]));
        let err = service
            .run_with_transport(Box::new(transport), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Channel(_)));
        device_task.await.unwrap();
    }
}
