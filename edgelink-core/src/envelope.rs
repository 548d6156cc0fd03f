//! Wire envelope and framed codec.
//!
//! Every message crosses the transport as one atomic frame:
//!
//! ```text
//! magic:       u32   b"EDL1"
//! checksum:    u32   first 4 bytes of blake3(payload); 0 iff payload empty
//! type:        u8    ChannelType discriminant
//! name_len:    u16
//! meta_len:    u16   0 when no metadata
//! timestamp:   u64   nanoseconds
//! payload_len: u32
//! name         [u8; name_len]     UTF-8
//! metadata     [u8; meta_len]     UTF-8
//! payload      [u8; payload_len]
//! ```
//!
//! All integers are little-endian. The checksum is *not* verified here:
//! a mismatch on an otherwise well-formed envelope is a payload fault
//! that belongs to the owning channel's error callback, not a reason to
//! kill the connection. Structural faults (bad magic, bad lengths) are
//! connection-fatal and surface as codec errors on the framed stream.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::channel::ChannelType;
use crate::error::ClientError;

// ── Constants ────────────────────────────────────────────────────

/// Fixed header size on the wire.
pub const HEADER_SIZE: usize = 25;

/// Maximum payload size accepted on either side.
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total frame size accepted by the decoder.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const MAGIC: [u8; 4] = *b"EDL1";

/// Wall-clock timestamp in nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Truncated blake3 checksum used in the envelope header.
pub fn checksum_of(payload: &[u8]) -> u32 {
    if payload.is_empty() {
        return 0;
    }
    let hash = blake3::hash(payload);
    let b = hash.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ── Envelope ─────────────────────────────────────────────────────

/// One multiplexed message: a typed payload on a named channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Logical channel name.
    pub channel: String,
    /// Declared payload encoding.
    pub channel_type: ChannelType,
    /// Send timestamp (or capture correlation timestamp) in ns.
    pub timestamp_ns: u64,
    /// Optional application metadata.
    pub metadata: Option<String>,
    /// Encoded payload bytes.
    pub payload: Bytes,
    /// Truncated blake3 of the payload, as carried in the header.
    pub checksum: u32,
}

impl Envelope {
    /// Build an envelope, computing the payload checksum.
    pub fn new(
        channel: impl Into<String>,
        channel_type: ChannelType,
        timestamp_ns: u64,
        payload: impl Into<Bytes>,
        metadata: Option<String>,
    ) -> Result<Self, ClientError> {
        let channel = channel.into();
        let payload = payload.into();
        if channel.is_empty() {
            return Err(ClientError::InvalidHeader("empty channel name"));
        }
        if channel.len() > u16::MAX as usize {
            return Err(ClientError::InvalidHeader("channel name too long"));
        }
        if let Some(meta) = &metadata {
            if meta.len() > u16::MAX as usize {
                return Err(ClientError::InvalidHeader("metadata too long"));
            }
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ClientError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let checksum = checksum_of(&payload);
        Ok(Self {
            channel,
            channel_type,
            timestamp_ns,
            metadata,
            payload,
            checksum,
        })
    }

    /// Whether the payload matches the checksum carried in the header.
    pub fn verify_checksum(&self) -> bool {
        checksum_of(&self.payload) == self.checksum
    }

    /// Total size this envelope occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE
            + self.channel.len()
            + self.metadata.as_ref().map_or(0, |m| m.len())
            + self.payload.len()
    }
}

// ── EnvelopeCodec ────────────────────────────────────────────────

/// Framed codec for [`Envelope`] over any byte stream.
#[derive(Debug, Default)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &src[..HEADER_SIZE];
        let mut magic = [0u8; 4];
        header.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(ClientError::InvalidMagic);
        }

        let checksum = header.get_u32_le();
        let type_byte = header.get_u8();
        let name_len = header.get_u16_le() as usize;
        let meta_len = header.get_u16_le() as usize;
        let timestamp_ns = header.get_u64_le();
        let payload_len = header.get_u32_le() as usize;

        let channel_type = ChannelType::try_from(type_byte)?;
        if name_len == 0 {
            return Err(ClientError::InvalidHeader("empty channel name"));
        }
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ClientError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total = HEADER_SIZE + name_len + meta_len + payload_len;
        if total > MAX_FRAME_SIZE {
            return Err(ClientError::FrameTooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total).freeze();
        let name_start = HEADER_SIZE;
        let meta_start = name_start + name_len;
        let payload_start = meta_start + meta_len;

        let channel = String::from_utf8(frame[name_start..meta_start].to_vec())?;
        let metadata = if meta_len > 0 {
            Some(String::from_utf8(frame[meta_start..payload_start].to_vec())?)
        } else {
            None
        };
        let payload = frame.slice(payload_start..total);

        Ok(Some(Envelope {
            channel,
            channel_type,
            timestamp_ns,
            metadata,
            payload,
            checksum,
        }))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ClientError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.channel.is_empty() {
            return Err(ClientError::InvalidHeader("empty channel name"));
        }
        if item.channel.len() > u16::MAX as usize {
            return Err(ClientError::InvalidHeader("channel name too long"));
        }
        let meta_len = item.metadata.as_ref().map_or(0, |m| m.len());
        if meta_len > u16::MAX as usize {
            return Err(ClientError::InvalidHeader("metadata too long"));
        }
        if item.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ClientError::PayloadTooLarge {
                size: item.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(item.wire_len());
        dst.put_slice(&MAGIC);
        dst.put_u32_le(item.checksum);
        dst.put_u8(item.channel_type as u8);
        dst.put_u16_le(item.channel.len() as u16);
        dst.put_u16_le(meta_len as u16);
        dst.put_u64_le(item.timestamp_ns);
        dst.put_u32_le(item.payload.len() as u32);
        dst.put_slice(item.channel.as_bytes());
        if let Some(meta) = &item.metadata {
            dst.put_slice(meta.as_bytes());
        }
        dst.put_slice(&item.payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new(
            "results",
            ChannelType::Json,
            123_456_789,
            Bytes::from_static(br#"{"x":1}"#),
            Some("cam-0".into()),
        )
        .unwrap()
    }

    #[test]
    fn envelope_roundtrip() {
        let env = sample();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env.clone(), &mut buf).unwrap();

        let decoded = EnvelopeCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, env);
        assert!(decoded.verify_checksum());
        assert!(buf.is_empty());
    }

    #[test]
    fn envelope_roundtrip_without_metadata() {
        let env = Envelope::new("image", ChannelType::Jpeg, 7, vec![1u8, 2, 3], None).unwrap();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env.clone(), &mut buf).unwrap();
        let decoded = EnvelopeCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.metadata, None);
        assert_eq!(decoded, env);
    }

    #[test]
    fn partial_buffer_returns_none() {
        let env = sample();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env, &mut buf).unwrap();

        let mut partial = BytesMut::from(&buf[..HEADER_SIZE + 2]);
        assert!(EnvelopeCodec.decode(&mut partial).unwrap().is_none());

        let mut short = BytesMut::from(&buf[..4]);
        assert!(EnvelopeCodec.decode(&mut short).unwrap().is_none());
    }

    #[test]
    fn two_frames_back_to_back() {
        let a = sample();
        let b = Envelope::new("image", ChannelType::Jpeg, 8, vec![9u8; 16], None).unwrap();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(a.clone(), &mut buf).unwrap();
        EnvelopeCodec.encode(b.clone(), &mut buf).unwrap();

        assert_eq!(EnvelopeCodec.decode(&mut buf).unwrap().unwrap(), a);
        assert_eq!(EnvelopeCodec.decode(&mut buf).unwrap().unwrap(), b);
        assert!(EnvelopeCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_magic_rejected() {
        let env = sample();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env, &mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            EnvelopeCodec.decode(&mut buf),
            Err(ClientError::InvalidMagic)
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        let env = sample();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env, &mut buf).unwrap();
        buf[8] = 0x7F; // type byte
        assert!(matches!(
            EnvelopeCodec.decode(&mut buf),
            Err(ClientError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn oversized_payload_rejected_on_build() {
        let big = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let result = Envelope::new("image", ChannelType::Jpeg, 0, big, None);
        assert!(matches!(result, Err(ClientError::PayloadTooLarge { .. })));
    }

    #[test]
    fn empty_channel_name_rejected() {
        let result = Envelope::new("", ChannelType::Json, 0, vec![1u8], None);
        assert!(matches!(result, Err(ClientError::InvalidHeader(_))));
    }

    #[test]
    fn tampered_payload_fails_checksum_but_decodes() {
        let env = sample();
        let mut buf = BytesMut::new();
        EnvelopeCodec.encode(env, &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        // Structurally valid, so the decoder hands it through; the
        // checksum verdict is for the multiplexer to act on.
        let decoded = EnvelopeCodec.decode(&mut buf).unwrap().unwrap();
        assert!(!decoded.verify_checksum());
    }

    #[test]
    fn empty_payload_has_zero_checksum() {
        let env = Envelope::new("ping", ChannelType::Json, 0, Bytes::new(), None).unwrap();
        assert_eq!(env.checksum, 0);
        assert!(env.verify_checksum());
    }
}
