//! JSON and LZ4-compressed JSON codecs.

use bytes::Bytes;

use crate::channel::ChannelType;
use crate::error::CodecError;

use super::{Payload, PayloadDecoder};

fn json_bytes(channel_type: ChannelType, payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let Payload::Json(value) = payload else {
        return Err(CodecError::EncodingMismatch {
            channel_type,
            payload: payload.kind(),
        });
    };
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn encode_plain(payload: &Payload) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(json_bytes(ChannelType::Json, payload)?))
}

pub(crate) fn encode_lz4(payload: &Payload) -> Result<Bytes, CodecError> {
    let raw = json_bytes(ChannelType::JsonLz4, payload)?;
    Ok(Bytes::from(lz4_flex::compress_prepend_size(&raw)))
}

struct PlainDecoder;

impl PayloadDecoder for PlainDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Payload, CodecError> {
        Ok(Payload::Json(serde_json::from_slice(bytes)?))
    }
}

struct Lz4Decoder;

impl PayloadDecoder for Lz4Decoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Payload, CodecError> {
        // Truncated or corrupt blocks surface as CodecError::Corrupt,
        // never as a low-level fault.
        let raw = lz4_flex::decompress_size_prepended(bytes)?;
        Ok(Payload::Json(serde_json::from_slice(&raw)?))
    }
}

pub(crate) fn plain_decoder() -> Box<dyn PayloadDecoder> {
    Box::new(PlainDecoder)
}

pub(crate) fn lz4_decoder() -> Box<dyn PayloadDecoder> {
    Box::new(Lz4Decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_roundtrip() {
        let value = json!({"x": 1});
        let bytes = encode_plain(&Payload::Json(value.clone())).unwrap();
        assert_eq!(bytes.as_ref(), br#"{"x":1}"#);

        let decoded = PlainDecoder.decode(&bytes).unwrap();
        assert_eq!(decoded, Payload::Json(value));
    }

    #[test]
    fn lz4_roundtrip_value_equality() {
        let value = json!({"detections": [[0, 0, 64, 64], [8, 8, 32, 32]], "frame": 17});
        let bytes = encode_lz4(&Payload::Json(value.clone())).unwrap();
        let decoded = Lz4Decoder.decode(&bytes).unwrap();
        assert_eq!(decoded, Payload::Json(value));
    }

    #[test]
    fn lz4_truncated_block_is_corrupt() {
        let bytes = encode_lz4(&Payload::Json(json!({"x": 1}))).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        let result = Lz4Decoder.decode(truncated);
        assert!(matches!(result, Err(CodecError::Corrupt(_))));
    }

    #[test]
    fn lz4_garbage_block_is_rejected() {
        // A size prefix promising far more than the block can yield.
        let mut garbage = vec![0xFFu8, 0xFF, 0x00, 0x00];
        garbage.extend_from_slice(&[0xAB; 8]);
        let result = Lz4Decoder.decode(&garbage);
        assert!(result.is_err());
    }

    #[test]
    fn non_json_payload_is_a_mismatch() {
        let result = encode_plain(&Payload::H264(Bytes::from_static(&[0, 0, 1, 0x65])));
        assert!(matches!(
            result,
            Err(CodecError::EncodingMismatch {
                channel_type: ChannelType::Json,
                ..
            })
        ));
    }
}
