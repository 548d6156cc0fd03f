//! H264 bitstream codec.
//!
//! Encode passes fragments through untouched — the encode pipeline
//! already produced a transport-ready Annex-B stream. Decode keeps a
//! **persistent per-channel context**: H264 units are not independently
//! decodable, so the decoder parses NAL units and tracks whether the
//! stream's SPS/PPS parameter sets have been seen before slice data is
//! accepted.

use bytes::Bytes;

use crate::channel::ChannelType;
use crate::error::CodecError;

use super::{Payload, PayloadDecoder};

// NAL unit types, ITU-T H.264 table 7-1.
const NAL_SLICE: u8 = 1;
const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

pub(crate) fn encode(payload: &Payload) -> Result<Bytes, CodecError> {
    let Payload::H264(bits) = payload else {
        return Err(CodecError::EncodingMismatch {
            channel_type: ChannelType::H264,
            payload: payload.kind(),
        });
    };
    if bits.is_empty() {
        return Err(CodecError::InvalidBitstream("empty fragment"));
    }
    Ok(bits.clone())
}

/// Stateful Annex-B decode context for one channel.
pub struct H264Decoder {
    seen_sps: bool,
    seen_pps: bool,
}

impl H264Decoder {
    pub fn new() -> Self {
        Self {
            seen_sps: false,
            seen_pps: false,
        }
    }
}

impl Default for H264Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadDecoder for H264Decoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Payload, CodecError> {
        for nal in split_nal_units(bytes)? {
            if nal.is_empty() {
                continue;
            }
            let header = nal[0];
            if header & 0x80 != 0 {
                return Err(CodecError::InvalidBitstream("forbidden_zero_bit set"));
            }
            match header & 0x1F {
                NAL_SPS => self.seen_sps = true,
                NAL_PPS => self.seen_pps = true,
                NAL_SLICE | NAL_IDR => {
                    if !(self.seen_sps && self.seen_pps) {
                        return Err(CodecError::MissingParameterSets);
                    }
                }
                _ => {}
            }
        }
        Ok(Payload::H264(Bytes::copy_from_slice(bytes)))
    }
}

/// Split an Annex-B fragment at its start codes (`00 00 01` or
/// `00 00 00 01`), yielding the NAL unit bodies.
fn split_nal_units(data: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                starts.push((i, i + 3));
                i += 3;
                continue;
            }
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                starts.push((i, i + 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    let Some(&(first, _)) = starts.first() else {
        return Err(CodecError::InvalidBitstream("missing start code"));
    };
    if first != 0 {
        return Err(CodecError::InvalidBitstream(
            "fragment does not begin with a start code",
        ));
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &(_, body)) in starts.iter().enumerate() {
        let end = starts
            .get(idx + 1)
            .map(|&(next, _)| next)
            .unwrap_or(data.len());
        units.push(&data[body..end]);
    }
    Ok(units)
}

pub(crate) fn decoder() -> Box<dyn PayloadDecoder> {
    Box::new(H264Decoder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(header: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 1, header];
        out.extend_from_slice(body);
        out
    }

    fn parameter_sets() -> Vec<u8> {
        let mut out = nal(0x67, &[0x42, 0x00, 0x1E]); // SPS
        out.extend_from_slice(&nal(0x68, &[0xCE, 0x38, 0x80])); // PPS
        out
    }

    #[test]
    fn idr_after_parameter_sets_decodes() {
        let mut decoder = H264Decoder::new();
        let mut fragment = parameter_sets();
        fragment.extend_from_slice(&nal(0x65, &[0x88, 0x84])); // IDR

        let decoded = decoder.decode(&fragment).unwrap();
        assert_eq!(decoded, Payload::H264(Bytes::from(fragment)));
    }

    #[test]
    fn slice_before_parameter_sets_is_rejected() {
        let mut decoder = H264Decoder::new();
        let fragment = nal(0x65, &[0x88, 0x84]);
        let result = decoder.decode(&fragment);
        assert!(matches!(result, Err(CodecError::MissingParameterSets)));
    }

    #[test]
    fn context_persists_across_fragments() {
        let mut decoder = H264Decoder::new();
        decoder.decode(&parameter_sets()).unwrap();

        // A later fragment with only slice data is fine: the context
        // remembers the parameter sets.
        let slice = nal(0x41, &[0x9A]);
        assert!(decoder.decode(&slice).is_ok());

        // A fresh per-channel context does not.
        let mut fresh = H264Decoder::new();
        assert!(matches!(
            fresh.decode(&slice),
            Err(CodecError::MissingParameterSets)
        ));
    }

    #[test]
    fn missing_start_code_is_invalid() {
        let mut decoder = H264Decoder::new();
        let result = decoder.decode(&[0x65, 0x88, 0x84]);
        assert!(matches!(result, Err(CodecError::InvalidBitstream(_))));
    }

    #[test]
    fn three_byte_start_codes_are_accepted() {
        let mut decoder = H264Decoder::new();
        let mut fragment = vec![0, 0, 1, 0x67, 0x42];
        fragment.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        fragment.extend_from_slice(&[0, 0, 1, 0x65, 0x88]);
        assert!(decoder.decode(&fragment).is_ok());
    }

    #[test]
    fn empty_fragment_cannot_be_encoded() {
        let result = encode(&Payload::H264(Bytes::new()));
        assert!(matches!(result, Err(CodecError::InvalidBitstream(_))));
    }
}
