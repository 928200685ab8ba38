//! Notification dispatcher
//!
//! Consumes unsolicited device notifications, resolves the reporting port
//! against the configured alias mapping, and publishes the resulting events
//! to the broadcast registry. A notification for an unmapped port is logged
//! and skipped; it never reaches any subscriber and never stops the loop.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::broadcast::BroadcastRegistry;
use super::channel::{ChannelError, Notification};
use super::event::Event;
use super::transport::TransportError;
use crate::config::SubscriberMap;

/// Bridges the notification stream into the broadcast registry.
pub struct Dispatcher {
    map: SubscriberMap,
    registry: BroadcastRegistry,
}

impl Dispatcher {
    /// Create a dispatcher over the given mapping and registry.
    pub fn new(map: SubscriberMap, registry: BroadcastRegistry) -> Self {
        Self { map, registry }
    }

    /// Run until the notification stream ends or `cancel` fires.
    ///
    /// A closed stream means the serial side is gone, which is a
    /// process-level failure; cancellation is a clean shutdown.
    pub async fn run(
        self,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
        cancel: CancellationToken,
    ) -> Result<(), ChannelError> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                notification = notifications.recv() => match notification {
                    Some(notification) => self.dispatch(notification),
                    None => return Err(ChannelError::Transport(TransportError::Closed)),
                },
            }
        }
    }

    fn dispatch(&self, notification: Notification) {
        match self.map.alias_for(&notification.port) {
            Some(alias) => {
                debug!(
                    port = %notification.port,
                    alias = %alias,
                    value = %notification.value,
                    "Publishing event"
                );
                self.registry
                    .publish(&Event::new(notification.port, notification.value));
            }
            None => error!(port = %notification.port, "Unknown port"),
        }
    }
}
