//! Channel identities and handler registration.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.

use std::fmt;
use std::sync::Arc;

use crate::codec::Payload;
use crate::error::{ClientError, CodecError};

// ── ChannelType ──────────────────────────────────────────────────

/// Payload encoding of a named logical channel.
///
/// A channel name is bound to exactly one type for the lifetime of the
/// connection; the binding determines how payload bytes are encoded
/// and decoded on both sides.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Plain UTF-8 JSON document.
    Json = 0x1,
    /// JSON document compressed as an LZ4 block with prepended size.
    JsonLz4 = 0x2,
    /// Raw H264 bitstream fragment (stateful decode).
    H264 = 0x3,
    /// Single baseline JPEG still image.
    Jpeg = 0x4,
}

impl TryFrom<u8> for ChannelType {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(ChannelType::Json),
            0x2 => Ok(ChannelType::JsonLz4),
            0x3 => Ok(ChannelType::H264),
            0x4 => Ok(ChannelType::Jpeg),
            _ => Err(ClientError::UnknownVariant {
                type_name: "ChannelType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Json => write!(f, "json"),
            ChannelType::JsonLz4 => write!(f, "json_lz4"),
            ChannelType::H264 => write!(f, "h264"),
            ChannelType::Jpeg => write!(f, "jpeg"),
        }
    }
}

impl ChannelType {
    /// Returns `true` for the channel types that carry JSON documents.
    pub fn is_json(&self) -> bool {
        matches!(self, ChannelType::Json | ChannelType::JsonLz4)
    }

    /// Returns `true` for the channel types that carry image data.
    pub fn is_image(&self) -> bool {
        matches!(self, ChannelType::H264 | ChannelType::Jpeg)
    }
}

// ── ChannelHandler ───────────────────────────────────────────────

/// Receiver side of a registered channel.
///
/// `on_value` runs on the connection's drain task: it must not block
/// indefinitely or it starves delivery on every other channel.
pub trait ChannelHandler: Send + Sync {
    /// A payload arrived and decoded successfully.
    fn on_value(&self, value: Payload, timestamp_ns: u64);

    /// A payload for this channel failed to decode.
    ///
    /// The default implementation logs and drops the message.
    fn on_error(&self, raw: &[u8], reason: &CodecError) {
        tracing::warn!(bytes = raw.len(), %reason, "dropping undecodable payload");
    }
}

/// Closure-backed [`ChannelHandler`].
struct FnHandler {
    value: Box<dyn Fn(Payload, u64) + Send + Sync>,
    error: Option<Box<dyn Fn(&[u8], &CodecError) + Send + Sync>>,
}

impl ChannelHandler for FnHandler {
    fn on_value(&self, value: Payload, timestamp_ns: u64) {
        (self.value)(value, timestamp_ns);
    }

    fn on_error(&self, raw: &[u8], reason: &CodecError) {
        match &self.error {
            Some(f) => f(raw, reason),
            None => {
                tracing::warn!(bytes = raw.len(), %reason, "dropping undecodable payload");
            }
        }
    }
}

// ── CallbackInfo ─────────────────────────────────────────────────

/// Association of a channel type with a success handler and an
/// optional error handler.
///
/// Registered before or at connection start; immutable afterward.
pub struct CallbackInfo {
    channel_type: ChannelType,
    handler: Arc<dyn ChannelHandler>,
}

impl CallbackInfo {
    /// Success handler only; decode errors are logged and dropped.
    pub fn new(
        channel_type: ChannelType,
        on_value: impl Fn(Payload, u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel_type,
            handler: Arc::new(FnHandler {
                value: Box::new(on_value),
                error: None,
            }),
        }
    }

    /// Success and error handlers.
    pub fn with_error(
        channel_type: ChannelType,
        on_value: impl Fn(Payload, u64) + Send + Sync + 'static,
        on_error: impl Fn(&[u8], &CodecError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel_type,
            handler: Arc::new(FnHandler {
                value: Box::new(on_value),
                error: Some(Box::new(on_error)),
            }),
        }
    }

    /// Wrap an existing handler implementation.
    pub fn from_handler(channel_type: ChannelType, handler: Arc<dyn ChannelHandler>) -> Self {
        Self {
            channel_type,
            handler,
        }
    }

    /// The channel type this callback is bound to.
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// The handler to invoke on the drain task.
    pub fn into_handler(self) -> Arc<dyn ChannelHandler> {
        self.handler
    }
}

impl fmt::Debug for CallbackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackInfo")
            .field("channel_type", &self.channel_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn channel_type_roundtrip() {
        let types = [
            ChannelType::Json,
            ChannelType::JsonLz4,
            ChannelType::H264,
            ChannelType::Jpeg,
        ];
        for ty in types {
            assert_eq!(ChannelType::try_from(ty as u8).unwrap(), ty);
        }
    }

    #[test]
    fn channel_type_invalid() {
        assert!(ChannelType::try_from(0x0).is_err());
        assert!(ChannelType::try_from(0xFF).is_err());
    }

    #[test]
    fn channel_type_families() {
        assert!(ChannelType::Json.is_json());
        assert!(ChannelType::JsonLz4.is_json());
        assert!(!ChannelType::H264.is_json());
        assert!(ChannelType::H264.is_image());
        assert!(ChannelType::Jpeg.is_image());
        assert!(!ChannelType::Json.is_image());
    }

    #[test]
    fn display_names() {
        assert_eq!(ChannelType::Json.to_string(), "json");
        assert_eq!(ChannelType::JsonLz4.to_string(), "json_lz4");
        assert_eq!(ChannelType::H264.to_string(), "h264");
        assert_eq!(ChannelType::Jpeg.to_string(), "jpeg");
    }

    #[test]
    fn callback_invokes_value_handler() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let info = CallbackInfo::new(ChannelType::Json, move |_, ts| {
            seen_clone.lock().unwrap().push(ts);
        });
        assert_eq!(info.channel_type(), ChannelType::Json);

        let handler = info.into_handler();
        handler.on_value(Payload::Json(serde_json::json!({"x": 1})), 42);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn callback_invokes_error_handler() {
        let errors: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let errors_clone = Arc::clone(&errors);
        let info = CallbackInfo::with_error(
            ChannelType::JsonLz4,
            |_, _| {},
            move |_, _| {
                *errors_clone.lock().unwrap() += 1;
            },
        );
        let handler = info.into_handler();
        handler.on_error(b"garbage", &CodecError::ChecksumMismatch);
        assert_eq!(*errors.lock().unwrap(), 1);
    }
}
