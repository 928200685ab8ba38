//! In-memory line transport for tests
//!
//! [`mock_pair`] returns the bridge-side transport together with a
//! [`MockDevice`] handle playing the role of the serial device: tests
//! observe the commands the bridge writes and inject response or
//! notification lines. Dropping the device handle closes the link, which
//! the bridge observes as a transport failure.

use super::{LineTransport, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Bridge-side half of an in-memory transport pair
pub struct MockLineTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Device-side half of an in-memory transport pair
pub struct MockDevice {
    commands: mpsc::UnboundedReceiver<String>,
    lines: mpsc::UnboundedSender<String>,
}

/// Create a connected transport/device pair.
pub fn mock_pair() -> (MockLineTransport, MockDevice) {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    (
        MockLineTransport {
            incoming: line_rx,
            outgoing: cmd_tx,
        },
        MockDevice {
            commands: cmd_rx,
            lines: line_tx,
        },
    )
}

impl MockDevice {
    /// Next command line the bridge wrote, or `None` once the bridge side
    /// is gone.
    pub async fn recv_command(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// Inject an inbound line as if the device had sent it.
    pub fn inject(&self, line: &str) {
        let _ = self.lines.send(line.to_string());
    }
}

#[async_trait]
impl LineTransport for MockLineTransport {
    async fn read_line(&mut self) -> Result<String, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Closed)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.outgoing
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_cross_the_pair_in_both_directions() {
        let (mut transport, mut device) = mock_pair();

        transport.write_line("P1.subscribe(0)").await.unwrap();
        assert_eq!(device.recv_command().await.unwrap(), "P1.subscribe(0)");

        device.inject("P1=42");
        assert_eq!(transport.read_line().await.unwrap(), "P1=42");
    }

    #[tokio::test]
    async fn dropped_device_reads_as_closed() {
        let (mut transport, device) = mock_pair();
        drop(device);

        assert!(matches!(
            transport.read_line().await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.write_line("x").await,
            Err(TransportError::Closed)
        ));
    }
}
