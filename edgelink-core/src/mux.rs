//! Channel multiplexer: typed logical streams over one connection.
//!
//! Outbound, `send` looks the channel up, encodes the payload through
//! the codec registry, wraps it in an envelope, and hands it to the
//! connection's writer task. Inbound, the drain task feeds
//! `on_message`, which dispatches to the channel's registered handler.
//!
//! Fault containment: anything wrong with one inbound message — bad
//! checksum, type disagreement, decode failure — goes to that channel's
//! error callback. A bad message never tears down the connection.
//!
//! Ordering: messages on the *same* channel reach their callback in the
//! order they were received on the transport (there is exactly one
//! drain task). No ordering is guaranteed across channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{ChannelHandler, ChannelType};
use crate::codec::{CodecRegistry, Payload, PayloadDecoder};
use crate::envelope::{Envelope, now_ns};
use crate::error::{ClientError, CodecError};
use crate::network::ConnectionSender;

struct ChannelEntry {
    channel_type: ChannelType,
    handler: Option<Arc<dyn ChannelHandler>>,
    decoder: Mutex<Box<dyn PayloadDecoder>>,
}

/// Multiplexes typed channels over a single transport connection.
pub struct ChannelMultiplexer {
    registry: CodecRegistry,
    channels: RwLock<HashMap<String, ChannelEntry>>,
    transport: RwLock<Option<ConnectionSender>>,
}

impl ChannelMultiplexer {
    pub fn new(registry: CodecRegistry) -> Self {
        Self {
            registry,
            channels: RwLock::new(HashMap::new()),
            transport: RwLock::new(None),
        }
    }

    fn channels_read(&self) -> RwLockReadGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn channels_write(&self) -> RwLockWriteGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_decoder<'a>(
        entry: &'a ChannelEntry,
    ) -> MutexGuard<'a, Box<dyn PayloadDecoder>> {
        entry.decoder.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Registration ─────────────────────────────────────────────

    /// Bind `name` to `channel_type`, with an optional inbound handler.
    ///
    /// A name already bound to a *different* type fails with
    /// [`ClientError::DuplicateChannel`]; re-registering the same
    /// name+type is an idempotent no-op that keeps the original
    /// handler.
    pub fn register_channel(
        &self,
        name: &str,
        channel_type: ChannelType,
        handler: Option<Arc<dyn ChannelHandler>>,
    ) -> Result<(), ClientError> {
        if name.is_empty() {
            return Err(ClientError::InvalidHeader("empty channel name"));
        }
        if !self.registry.supports(channel_type) {
            return Err(CodecError::Unsupported(channel_type).into());
        }

        let mut channels = self.channels_write();
        if let Some(entry) = channels.get(name) {
            if entry.channel_type == channel_type {
                return Ok(());
            }
            return Err(ClientError::DuplicateChannel(name.to_string()));
        }

        let decoder = self.registry.new_decoder(channel_type)?;
        channels.insert(
            name.to_string(),
            ChannelEntry {
                channel_type,
                handler,
                decoder: Mutex::new(decoder),
            },
        );
        Ok(())
    }

    /// The type `name` is bound to, if registered.
    pub fn channel_type(&self, name: &str) -> Option<ChannelType> {
        self.channels_read().get(name).map(|e| e.channel_type)
    }

    // ── Transport attachment ─────────────────────────────────────

    /// Attach the connection's writer handle after connect.
    pub(crate) fn attach(&self, sender: ConnectionSender) {
        *self.transport.write().unwrap_or_else(|e| e.into_inner()) = Some(sender);
    }

    /// Detach the transport; subsequent sends fail with `NotConnected`.
    pub(crate) fn detach(&self) {
        *self.transport.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Whether a transport is currently attached.
    pub fn is_attached(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn transport_sender(&self) -> Result<ConnectionSender, ClientError> {
        self.transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    // ── Send path ────────────────────────────────────────────────

    /// Encode and send one payload on a registered channel.
    ///
    /// Failures are synchronous and leave the transport untouched: an
    /// unregistered name is [`ClientError::UnknownChannel`], a payload
    /// incompatible with the channel's type is a codec error, and a
    /// missing transport is [`ClientError::NotConnected`]. Retry policy
    /// belongs to the caller.
    pub async fn send(
        &self,
        name: &str,
        payload: &Payload,
        timestamp_ns: Option<u64>,
        metadata: Option<String>,
    ) -> Result<(), ClientError> {
        let channel_type = self
            .channel_type(name)
            .ok_or_else(|| ClientError::UnknownChannel(name.to_string()))?;
        let bytes = self.registry.encode(channel_type, payload)?;
        self.send_encoded(name, channel_type, bytes, timestamp_ns, metadata)
            .await
    }

    /// Send pre-encoded payload bytes on a registered channel.
    ///
    /// The caller vouches that `bytes` already match the channel's wire
    /// encoding.
    pub async fn send_raw(
        &self,
        name: &str,
        bytes: Bytes,
        timestamp_ns: Option<u64>,
        metadata: Option<String>,
    ) -> Result<(), ClientError> {
        let channel_type = self
            .channel_type(name)
            .ok_or_else(|| ClientError::UnknownChannel(name.to_string()))?;
        self.send_encoded(name, channel_type, bytes, timestamp_ns, metadata)
            .await
    }

    async fn send_encoded(
        &self,
        name: &str,
        channel_type: ChannelType,
        bytes: Bytes,
        timestamp_ns: Option<u64>,
        metadata: Option<String>,
    ) -> Result<(), ClientError> {
        let sender = self.transport_sender()?;
        let envelope = Envelope::new(
            name,
            channel_type,
            timestamp_ns.unwrap_or_else(now_ns),
            bytes,
            metadata,
        )?;
        sender
            .send(envelope)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    // ── Receive path ─────────────────────────────────────────────

    /// Dispatch one inbound envelope to its channel's handler.
    pub fn on_message(&self, envelope: &Envelope) {
        let (handler, verdict) = {
            let channels = self.channels_read();
            let Some(entry) = channels.get(&envelope.channel) else {
                // Unknown channels can legitimately arrive before local
                // registration completes.
                debug!(channel = %envelope.channel, "dropping message for unknown channel");
                return;
            };
            let Some(handler) = entry.handler.clone() else {
                debug!(channel = %envelope.channel, "dropping message for send-only channel");
                return;
            };

            let verdict = if !envelope.verify_checksum() {
                Err(CodecError::ChecksumMismatch)
            } else if envelope.channel_type != entry.channel_type {
                Err(CodecError::TypeMismatch {
                    declared: envelope.channel_type,
                    registered: entry.channel_type,
                })
            } else {
                Self::lock_decoder(entry).decode(&envelope.payload)
            };
            (handler, verdict)
        };

        // Callbacks run outside the registry locks, on the drain task.
        match verdict {
            Ok(value) => handler.on_value(value, envelope.timestamp_ns),
            Err(reason) => handler.on_error(&envelope.payload, &reason),
        }
    }

    /// Drain inbound envelopes until the connection closes.
    ///
    /// This is the single consumer for inbound messages; handlers
    /// execute on this task and must not block.
    pub async fn run_drain(self: Arc<Self>, mut inbound: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = inbound.recv().await {
            self.on_message(&envelope);
        }
        debug!("inbound drain finished");
    }
}

// ── Tests ────────────────────────────────────────────────────────
