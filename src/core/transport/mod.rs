//! Line-oriented transport layer under the serial command channel
//!
//! The channel only ever sees whole text lines; framing, baud setup and
//! device handling live behind [`LineTransport`]. Production uses the
//! serial implementation; tests use the in-memory mock pair.

pub mod mock;
mod serial;

pub use mock::{mock_pair, MockDevice, MockLineTransport};
pub use serial::SerialLineTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Device could not be opened
    #[error("Failed to open {device}: {source}")]
    Open {
        /// Device path that was attempted
        device: String,
        /// Underlying serial error
        #[source]
        source: tokio_serial::Error,
    },

    /// I/O failure on the link
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound line exceeded the frame limit
    #[error("Inbound line exceeded {0} bytes")]
    LineTooLong(usize),

    /// The link closed
    #[error("Transport closed")]
    Closed,
}

/// A bidirectional stream of text lines.
///
/// `read_line` suspends until a full line arrives and must be cancel-safe;
/// `write_line` appends the line terminator and flushes.
#[async_trait]
pub trait LineTransport: Send {
    /// Read the next inbound line, without its terminator.
    async fn read_line(&mut self) -> Result<String, TransportError>;

    /// Write one outbound line.
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError>;
}
