//! Codec registry: channel-type tag → encode/decode pair.
//!
//! The registry is an explicit value built at client startup and passed
//! into the multiplexer — no process-wide state. Encoding is stateless;
//! decoding goes through one [`PayloadDecoder`] instance per channel,
//! which gives stateful formats (H264) a persistent context.

pub mod h264;
pub mod jpeg;
pub mod json;

use std::collections::HashMap;

use bytes::Bytes;

use crate::channel::ChannelType;
use crate::error::CodecError;
use crate::video::types::PixelBuffer;

// ── Payload ──────────────────────────────────────────────────────

/// A structured value traveling over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON document (JSON and JSON_LZ4 channels).
    Json(serde_json::Value),
    /// Decoded still image (JPEG channels).
    Image(PixelBuffer),
    /// Raw H264 bitstream fragment (H264 channels).
    H264(Bytes),
}

impl Payload {
    /// Short tag used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Image(_) => "image",
            Payload::H264(_) => "h264",
        }
    }
}

// ── PayloadDecoder ───────────────────────────────────────────────

/// Stateful decode half of a codec pair.
///
/// One instance exists per registered channel; implementations may keep
/// cross-message state (the H264 decoder tracks parameter sets).
pub trait PayloadDecoder: Send {
    fn decode(&mut self, bytes: &[u8]) -> Result<Payload, CodecError>;
}

// ── CodecRegistry ────────────────────────────────────────────────

type EncodeFn = fn(&Payload) -> Result<Bytes, CodecError>;
type DecoderFactory = fn() -> Box<dyn PayloadDecoder>;

struct CodecEntry {
    encode: EncodeFn,
    decoder: DecoderFactory,
}

/// Maps each [`ChannelType`] to its encode function and decoder
/// factory.
pub struct CodecRegistry {
    entries: HashMap<ChannelType, CodecEntry>,
}

impl CodecRegistry {
    /// Registry covering every built-in channel type.
    pub fn with_defaults() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ChannelType::Json,
            CodecEntry {
                encode: json::encode_plain,
                decoder: json::plain_decoder,
            },
        );
        entries.insert(
            ChannelType::JsonLz4,
            CodecEntry {
                encode: json::encode_lz4,
                decoder: json::lz4_decoder,
            },
        );
        entries.insert(
            ChannelType::Jpeg,
            CodecEntry {
                encode: jpeg::encode,
                decoder: jpeg::decoder,
            },
        );
        entries.insert(
            ChannelType::H264,
            CodecEntry {
                encode: h264::encode,
                decoder: h264::decoder,
            },
        );
        Self { entries }
    }

    /// Whether a codec is registered for `channel_type`.
    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.entries.contains_key(&channel_type)
    }

    /// Encode `payload` for a channel of `channel_type`.
    ///
    /// A payload variant incompatible with the type fails with
    /// [`CodecError::EncodingMismatch`]; nothing reaches the transport.
    pub fn encode(&self, channel_type: ChannelType, payload: &Payload) -> Result<Bytes, CodecError> {
        let entry = self
            .entries
            .get(&channel_type)
            .ok_or(CodecError::Unsupported(channel_type))?;
        (entry.encode)(payload)
    }

    /// Create a fresh decoder instance for one channel.
    pub fn new_decoder(
        &self,
        channel_type: ChannelType,
    ) -> Result<Box<dyn PayloadDecoder>, CodecError> {
        let entry = self
            .entries
            .get(&channel_type)
            .ok_or(CodecError::Unsupported(channel_type))?;
        Ok((entry.decoder)())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_cover_all_types() {
        let registry = CodecRegistry::with_defaults();
        for ty in [
            ChannelType::Json,
            ChannelType::JsonLz4,
            ChannelType::H264,
            ChannelType::Jpeg,
        ] {
            assert!(registry.supports(ty), "missing codec for {ty}");
            assert!(registry.new_decoder(ty).is_ok());
        }
    }

    #[test]
    fn roundtrip_json_value_through_each_json_type() {
        let registry = CodecRegistry::with_defaults();
        let value = json!({"x": 1, "tags": ["a", "b"], "ok": true});

        for ty in [ChannelType::Json, ChannelType::JsonLz4] {
            let bytes = registry.encode(ty, &Payload::Json(value.clone())).unwrap();
            let mut decoder = registry.new_decoder(ty).unwrap();
            let decoded = decoder.decode(&bytes).unwrap();
            assert_eq!(decoded, Payload::Json(value.clone()), "{ty}");
        }
    }

    #[test]
    fn encoding_mismatch_is_typed() {
        let registry = CodecRegistry::with_defaults();
        let result = registry.encode(ChannelType::Jpeg, &Payload::Json(json!(1)));
        assert!(matches!(result, Err(CodecError::EncodingMismatch { .. })));
    }
}
