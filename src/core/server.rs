//! TCP event server
//!
//! Accepts subscriber connections and streams events to each one as
//! newline-delimited JSON objects. Every connection gets its own session
//! task and its own sink; the sink's drop guard guarantees deregistration
//! on every exit path, so a failing peer only ever takes down its own
//! session.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::broadcast::{BroadcastRegistry, Sink};

/// Maximum accepted inbound line length from a peer. Subscribers are
/// stream-only, so a peer pushing more than a short line without a
/// newline is misbehaving and gets disconnected instead of growing the
/// read buffer.
const MAX_PEER_LINE_LEN: usize = 1024;

/// TCP listener fanning registry events out to connected peers.
pub struct EventServer {
    registry: BroadcastRegistry,
}

impl EventServer {
    /// Create a server publishing from `registry`.
    pub fn new(registry: BroadcastRegistry) -> Self {
        Self { registry }
    }

    /// Bind `host:port` and start the supervised accept loop.
    ///
    /// Returns the bound address (useful with port 0) and the accept task,
    /// which runs until `cancel` fires.
    pub async fn bind(
        &self,
        host: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let registry = self.registry.clone();
        let task = tokio::spawn(accept_loop(listener, registry, cancel));
        Ok((addr, task))
    }
}

async fn accept_loop(listener: TcpListener, registry: BroadcastRegistry, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Subscriber connected");
                    let sink = registry.register();
                    tokio::spawn(session(stream, peer, sink, cancel.clone()));
                }
                Err(e) => {
                    warn!("Accept failed: {e}");
                    // Transient accept errors (fd exhaustion etc.) should
                    // not spin the loop
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            },
        }
    }
}

/// One subscriber connection: stream events until the peer goes away, the
/// registry closes the sink, or shutdown is requested.
async fn session(stream: TcpStream, peer: SocketAddr, mut sink: Sink, cancel: CancellationToken) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_PEER_LINE_LEN));

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = sink.recv() => {
                let Some(event) = event else { break };
                let line = match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(%peer, "Failed to serialize event: {e}");
                        continue;
                    }
                };
                if let Err(e) = framed.send(line).await {
                    debug!(%peer, "Write failed: {e}");
                    break;
                }
            }
            inbound = framed.next() => match inbound {
                // Subscribers are stream-only; anything they send is ignored
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%peer, "Read failed: {e}");
                    break;
                }
                None => {
                    debug!(%peer, "Subscriber disconnected");
                    break;
                }
            },
        }
    }

    // Sink drop deregisters it; close the socket explicitly afterwards
    drop(sink);
    let _ = framed.into_inner().shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Event;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    async fn wait_for_sinks(registry: &BroadcastRegistry, n: usize) {
        for _ in 0..100 {
            if registry.len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {n} sinks");
    }

    #[tokio::test]
    async fn connected_peer_receives_published_events_as_json_lines() {
        let registry = BroadcastRegistry::new();
        let cancel = CancellationToken::new();
        let (addr, task) = EventServer::new(registry.clone())
            .bind("127.0.0.1", 0, cancel.clone())
            .await
            .unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let mut reader = BufReader::new(client);
        wait_for_sinks(&registry, 1).await;

        registry.publish(&Event::new("P1", "42"));

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim_end(), r#"{"port":"P1","value":"42"}"#);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn peer_disconnect_deregisters_its_sink() {
        let registry = BroadcastRegistry::new();
        let cancel = CancellationToken::new();
        let (addr, task) = EventServer::new(registry.clone())
            .bind("127.0.0.1", 0, cancel.clone())
            .await
            .unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_sinks(&registry, 1).await;

        drop(client);
        wait_for_sinks(&registry, 0).await;

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn peer_streaming_without_newlines_is_disconnected() {
        let registry = BroadcastRegistry::new();
        let cancel = CancellationToken::new();
        let (addr, task) = EventServer::new(registry.clone())
            .bind("127.0.0.1", 0, cancel.clone())
            .await
            .unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        wait_for_sinks(&registry, 1).await;

        // Far more than the frame limit, never a newline: the session
        // must drop the peer instead of buffering indefinitely
        let blob = vec![b'x'; 64 * 1024];
        let _ = client.write_all(&blob).await;
        let _ = client.flush().await;

        wait_for_sinks(&registry, 0).await;

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_accepting_and_closes_sessions() {
        let registry = BroadcastRegistry::new();
        let cancel = CancellationToken::new();
        let (addr, task) = EventServer::new(registry.clone())
            .bind("127.0.0.1", 0, cancel.clone())
            .await
            .unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_sinks(&registry, 1).await;

        cancel.cancel();
        task.await.unwrap();
        wait_for_sinks(&registry, 0).await;

        // The session closed its end; reads now return EOF
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.unwrap();
        assert_eq!(n, 0);
    }
}
