//! Serial port line transport built on tokio-serial

use super::{LineTransport, TransportError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Maximum accepted inbound line length. The device protocol is short
/// command echoes and `port=value` notifications; anything longer is a
/// framing fault.
const MAX_LINE_LEN: usize = 1024;

/// Line-framed serial port
pub struct SerialLineTransport {
    framed: Framed<SerialStream, LinesCodec>,
}

impl SerialLineTransport {
    /// Open `device` at `baud` and frame it into lines.
    pub fn open(device: &str, baud: u32) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(device, baud)
            .open_native_async()
            .map_err(|source| TransportError::Open {
                device: device.to_string(),
                source,
            })?;

        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LEN)),
        })
    }
}

fn map_codec_err(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => TransportError::LineTooLong(MAX_LINE_LEN),
        LinesCodecError::Io(e) => TransportError::Io(e),
    }
}

#[async_trait]
impl LineTransport for SerialLineTransport {
    async fn read_line(&mut self) -> Result<String, TransportError> {
        match self.framed.next().await {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(map_codec_err(e)),
            None => Err(TransportError::Closed),
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.framed.send(line).await.map_err(map_codec_err)
    }
}
