//! Managed transport connection.
//!
//! Splits a framed byte stream into a background writer task and a
//! background reader task, bridged to the caller by bounded mpsc
//! channels. The writer task is the only point where bytes reach the
//! transport, so two concurrent senders can never interleave the bytes
//! of two envelopes — encoding happens on the caller, the write is
//! serialized here.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use futures::{SinkExt, StreamExt};
use tracing::warn;

use crate::envelope::{Envelope, EnvelopeCodec};
use crate::error::ClientError;

/// Bound of the in-flight envelope queues.
const QUEUE_DEPTH: usize = 100;

/// Cloneable handle feeding the connection's writer task.
pub type ConnectionSender = mpsc::Sender<Envelope>;

/// A connection to a single NetApp endpoint.
#[derive(Debug)]
pub struct Connection {
    // Channel to send envelopes to the background writer task.
    tx: mpsc::Sender<Envelope>,
    // Channel to receive envelopes from the background reader task.
    rx: mpsc::Receiver<Envelope>,
}

impl Connection {
    /// Wrap an established bidirectional stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut net_writer, mut net_reader) =
            Framed::new(stream, EnvelopeCodec::default()).split();

        // User -> network.
        let (user_tx, mut outbound_rx) = mpsc::channel(QUEUE_DEPTH);

        // Network -> user.
        let (inbound_tx, user_rx) = mpsc::channel(QUEUE_DEPTH);

        // Writer task: user -> network.
        tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                if let Err(e) = net_writer.send(envelope).await {
                    warn!(error = %e, "transport write failed");
                    break;
                }
            }
        });

        // Reader task: network -> user.
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).await.is_err() {
                            // user_rx was dropped, stop reading
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "transport read failed");
                        break;
                    }
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    /// Dial a NetApp endpoint over TCP.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(info.addr()).await?;
        Ok(Self::new(stream))
    }

    /// Queue one envelope for the writer task.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ClientError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Receive the next inbound envelope; `None` once the transport is
    /// gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// A cloneable sender handle for the writer task.
    pub fn sender(&self) -> ConnectionSender {
        self.tx.clone()
    }

    /// Split into the shared sender handle and the inbound receiver
    /// for the drain task.
    pub fn into_parts(self) -> (ConnectionSender, mpsc::Receiver<Envelope>) {
        (self.tx, self.rx)
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// NetApp endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form accepted by the TCP dialer.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelType;
    use bytes::Bytes;
    use tokio_test::assert_ok;

    fn envelope(channel: &str, ts: u64) -> Envelope {
        Envelope::new(
            channel,
            ChannelType::Json,
            ts,
            Bytes::from_static(br#"{"x":1}"#),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn duplex_roundtrip() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = Connection::new(a);
        let mut right = Connection::new(b);

        assert_ok!(left.send(envelope("results", 7)).await);
        let received = right.recv().await.unwrap();
        assert_eq!(received.channel, "results");
        assert_eq!(received.timestamp_ns, 7);
        assert!(received.verify_checksum());
    }

    #[tokio::test]
    async fn envelopes_arrive_in_send_order() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let left = Connection::new(a);
        let mut right = Connection::new(b);

        for ts in 1..=20u64 {
            left.send(envelope("seq", ts)).await.unwrap();
        }
        for ts in 1..=20u64 {
            assert_eq!(right.recv().await.unwrap().timestamp_ns, ts);
        }
    }

    #[tokio::test]
    async fn recv_returns_none_after_peer_drop() {
        let (a, b) = tokio::io::duplex(1024);
        let left = Connection::new(a);
        let mut right = Connection::new(b);

        drop(left);
        // Give the dropped peer's reader something to choke on so its
        // background tasks wind down and the stream closes.
        right.send(envelope("poke", 1)).await.unwrap();
        assert!(right.recv().await.is_none());
    }

    #[test]
    fn connection_info_formats_addr() {
        let info = ConnectionInfo::new("netapp.local", 5896);
        assert_eq!(info.addr(), "netapp.local:5896");
        assert_eq!(info.to_string(), "netapp.local:5896");
    }
}
