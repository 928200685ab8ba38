//! Serial command channel
//!
//! Layers a request/response discipline over a transport that only delivers
//! unstructured lines. A single actor task owns the transport and
//! multiplexes outbound commands against inbound lines:
//!
//! - a line arriving while a command is outstanding is its response when it
//!   echoes the command text; otherwise it is routed like any other line;
//! - `port=value` lines are unsolicited notifications, surfaced on a
//!   separate stream for the dispatcher;
//! - anything else is logged and counted, never silently discarded.
//!
//! At most one command is in flight at a time; concurrent callers queue in
//! the actor's mailbox.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::transport::{LineTransport, TransportError};

/// Command written to reboot the device.
const RESET_COMMAND: &str = "reset()";

/// Substring of the announcement the device prints once it is up again.
const READY_MARKER: &str = "ready";

/// Mailbox depth for queued command requests.
const REQUEST_QUEUE: usize = 8;

/// Channel error types
#[derive(Error, Debug)]
pub enum ChannelError {
    /// No correlated response arrived within the deadline
    #[error("Command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// The underlying serial link failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The channel closed while the command was outstanding
    #[error("Serial channel is shutting down")]
    ShuttingDown,
}

/// Channel tuning knobs
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Deadline for a correlated command response
    pub command_timeout: Duration,
    /// Deadline for the ready announcement after a reset
    pub reboot_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(2),
            reboot_timeout: Duration::from_secs(5),
        }
    }
}

/// An unsolicited `port=value` line from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Device port that reported
    pub port: String,
    /// Reported value text
    pub value: String,
}

impl Notification {
    /// Parse a `port=value` line; returns `None` for anything else.
    pub fn parse(line: &str) -> Option<Self> {
        let (port, value) = line.split_once('=')?;
        let port = port.trim();
        if port.is_empty() {
            return None;
        }
        Some(Self {
            port: port.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// How a response line is recognized for an outstanding request.
enum Expect {
    /// Response echoes the command text
    Echo,
    /// Response contains a fixed marker (reset handshake)
    Marker(&'static str),
}

struct Request {
    command: String,
    expect: Expect,
    timeout: Duration,
    reply: oneshot::Sender<Result<String, ChannelError>>,
}

impl Request {
    fn matches(&self, line: &str) -> bool {
        match self.expect {
            Expect::Echo => line.starts_with(&self.command),
            Expect::Marker(marker) => line.contains(marker),
        }
    }
}

/// Handle to the serial command channel.
///
/// Cheap to clone. When the actor stops (transport failure or all handles
/// dropped), outstanding and subsequent calls fail with
/// [`ChannelError::ShuttingDown`].
#[derive(Clone)]
pub struct SerialChannel {
    requests: mpsc::Sender<Request>,
    config: ChannelConfig,
}

impl SerialChannel {
    /// Start the channel over `transport`.
    ///
    /// Returns the command handle and the stream of unsolicited
    /// notifications; the stream ends when the transport fails or the
    /// channel shuts down.
    pub fn start(
        transport: Box<dyn LineTransport>,
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE);
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();

        tokio::spawn(
            ChannelActor {
                transport,
                requests: req_rx,
                notifications: notif_tx,
                unrecognized: 0,
            }
            .run(),
        );

        (
            Self {
                requests: req_tx,
                config,
            },
            notif_rx,
        )
    }

    /// Write `command` and wait for its echo-correlated response line.
    pub async fn send_and_wait(&self, command: &str) -> Result<String, ChannelError> {
        self.request(
            command.to_string(),
            Expect::Echo,
            self.config.command_timeout,
        )
        .await
    }

    /// Subscribe a device port: `<port>.subscribe(0)`.
    pub async fn subscribe(&self, port: &str) -> Result<String, ChannelError> {
        self.send_and_wait(&format!("{port}.subscribe(0)")).await
    }

    /// Reset the device and wait for it to announce readiness.
    ///
    /// Best-effort: some devices come up without an explicit
    /// acknowledgment, so callers are expected to log a failure and
    /// continue.
    pub async fn try_reboot(&self) -> Result<(), ChannelError> {
        self.request(
            RESET_COMMAND.to_string(),
            Expect::Marker(READY_MARKER),
            self.config.reboot_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn request(
        &self,
        command: String,
        expect: Expect,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request {
                command,
                expect,
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChannelError::ShuttingDown)?;
        reply_rx.await.map_err(|_| ChannelError::ShuttingDown)?
    }
}

/// Owns the transport; the only task that ever reads or writes it.
struct ChannelActor {
    transport: Box<dyn LineTransport>,
    requests: mpsc::Receiver<Request>,
    notifications: mpsc::UnboundedSender<Notification>,
    /// Lines that were neither responses nor notifications
    unrecognized: u64,
}

impl ChannelActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                req = self.requests.recv() => match req {
                    Some(req) => {
                        if self.handle_request(req).await.is_err() {
                            break;
                        }
                    }
                    // All channel handles dropped
                    None => break,
                },
                line = self.transport.read_line() => match line {
                    Ok(line) => self.route_line(&line),
                    Err(e) => {
                        error!("Serial transport failed: {e}");
                        break;
                    }
                },
            }
        }
        // Dropping the actor ends the notification stream and fails any
        // queued requests with ShuttingDown.
    }

    /// Runs one request to completion. `Err` means the transport is gone
    /// and the actor must stop.
    async fn handle_request(&mut self, req: Request) -> Result<(), ()> {
        debug!(command = %req.command, "Sending command");
        if let Err(e) = self.transport.write_line(&req.command).await {
            error!("Serial write failed: {e}");
            let _ = req.reply.send(Err(ChannelError::Transport(e)));
            return Err(());
        }

        let deadline = tokio::time::Instant::now() + req.timeout;
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    warn!(command = %req.command, "No response within {:?}", req.timeout);
                    let _ = req.reply.send(Err(ChannelError::CommandTimeout(req.timeout)));
                    return Ok(());
                }
                line = self.transport.read_line() => match line {
                    Ok(line) => {
                        if req.matches(&line) {
                            debug!(command = %req.command, response = %line, "Response correlated");
                            let _ = req.reply.send(Ok(line));
                            return Ok(());
                        }
                        // Unsolicited traffic keeps flowing while we wait
                        self.route_line(&line);
                    }
                    Err(e) => {
                        error!("Serial transport failed: {e}");
                        let _ = req.reply.send(Err(ChannelError::Transport(e)));
                        return Err(());
                    }
                },
            }
        }
    }

    fn route_line(&mut self, line: &str) {
        match Notification::parse(line) {
            Some(notification) => {
                let _ = self.notifications.send(notification);
            }
            None => {
                self.unrecognized += 1;
                debug!(%line, total = self.unrecognized, "Ignoring unrecognized serial line");
            }
        }
    }
}
