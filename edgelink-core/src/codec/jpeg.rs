//! JPEG still-image codec.
//!
//! Encode accepts packed Rgb8 or Bgra8 buffers; decode always yields
//! Rgb8. The capture-side I420 format is an encoder-pipeline concern
//! and is rejected here.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use crate::channel::ChannelType;
use crate::error::CodecError;
use crate::video::types::{PixelBuffer, PixelFormat};

use super::{Payload, PayloadDecoder};

/// Default quality for direct still sends.
pub const DEFAULT_QUALITY: u8 = 90;

pub(crate) fn encode(payload: &Payload) -> Result<Bytes, CodecError> {
    let Payload::Image(buffer) = payload else {
        return Err(CodecError::EncodingMismatch {
            channel_type: ChannelType::Jpeg,
            payload: payload.kind(),
        });
    };
    encode_with_quality(buffer, DEFAULT_QUALITY)
}

/// Encode one pixel buffer as a baseline JPEG at the given quality.
pub fn encode_with_quality(buffer: &PixelBuffer, quality: u8) -> Result<Bytes, CodecError> {
    let rgb: Vec<u8> = match buffer.format {
        PixelFormat::Rgb8 => buffer.data.to_vec(),
        PixelFormat::Bgra8 => bgra_to_rgb(&buffer.data),
        PixelFormat::I420 => {
            return Err(CodecError::UnsupportedPixelFormat(PixelFormat::I420));
        }
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        &rgb,
        buffer.width,
        buffer.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}

fn bgra_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for px in data.chunks_exact(4) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

struct JpegDecoder;

impl PayloadDecoder for JpegDecoder {
    fn decode(&mut self, bytes: &[u8]) -> Result<Payload, CodecError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        let buffer = PixelBuffer::new(width, height, PixelFormat::Rgb8, rgb.into_raw())
            .map_err(|e| CodecError::Image(e.to_string()))?;
        Ok(Payload::Image(buffer))
    }
}

pub(crate) fn decoder() -> Box<dyn PayloadDecoder> {
    Box::new(JpegDecoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128]);
            }
        }
        PixelBuffer::new(width, height, PixelFormat::Rgb8, data).unwrap()
    }

    #[test]
    fn encode_then_decode_preserves_shape() {
        let buffer = gradient_rgb(16, 8);
        let bytes = encode_with_quality(&buffer, 90).unwrap();
        assert!(!bytes.is_empty());

        let decoded = JpegDecoder.decode(&bytes).unwrap();
        let Payload::Image(img) = decoded else {
            panic!("expected image payload");
        };
        assert_eq!(img.width, 16);
        assert_eq!(img.height, 8);
        assert_eq!(img.format, PixelFormat::Rgb8);
    }

    #[test]
    fn bgra_input_is_converted() {
        let data = vec![0u8; 4 * 4 * 4];
        let buffer = PixelBuffer::new(4, 4, PixelFormat::Bgra8, data).unwrap();
        let bytes = encode_with_quality(&buffer, 80).unwrap();
        assert!(JpegDecoder.decode(&bytes).is_ok());
    }

    #[test]
    fn i420_input_is_rejected() {
        let buffer = PixelBuffer::new(4, 4, PixelFormat::I420, vec![0u8; 24]).unwrap();
        let result = encode_with_quality(&buffer, 90);
        assert!(matches!(
            result,
            Err(CodecError::UnsupportedPixelFormat(PixelFormat::I420))
        ));
    }

    #[test]
    fn garbage_bytes_fail_decode() {
        let result = JpegDecoder.decode(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(matches!(result, Err(CodecError::Image(_))));
    }

    #[test]
    fn non_image_payload_is_a_mismatch() {
        let result = encode(&Payload::Json(serde_json::json!({})));
        assert!(matches!(result, Err(CodecError::EncodingMismatch { .. })));
    }
}
