//! Video encoder seam.
//!
//! The pipeline is encoder-agnostic: anything implementing
//! [`VideoEncoder`] can sit behind it. Real encoders buffer internally
//! (lookahead, B-frames), so one `encode` call may yield zero or more
//! chunks — each chunk carries the capture timestamp of the frame it
//! visually represents, never the emission time, so a result received
//! later can be matched back to the original image.
//!
//! The default H264 implementation wraps OpenH264 and is gated behind
//! the `openh264` cargo feature.

use bytes::Bytes;

use crate::error::ClientError;
use crate::video::types::RawFrame;

// ── EncodedChunk ─────────────────────────────────────────────────

/// A compressed bitstream fragment ready for an H264 channel.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Annex-B bitstream bytes.
    pub data: Bytes,
    /// Capture timestamp of the frame this chunk represents.
    pub timestamp_ns: u64,
    /// Whether the fragment starts an independently decodable picture.
    pub keyframe: bool,
}

// ── VideoEncoder ─────────────────────────────────────────────────

/// Encode half of a video codec.
pub trait VideoEncoder: Send + Sync {
    /// Feed one frame; returns whatever chunks completed.
    fn encode(&mut self, frame: &RawFrame) -> Result<Vec<EncodedChunk>, ClientError>;

    /// Drain everything the encoder still buffers.
    fn flush(&mut self) -> Result<Vec<EncodedChunk>, ClientError>;
}

// ── OpenH264 implementation ──────────────────────────────────────

#[cfg(feature = "openh264")]
mod openh264_impl {
    use openh264::OpenH264API;
    use openh264::encoder::{Encoder, EncoderConfig};
    use openh264::formats::YUVSource;

    use super::*;
    use crate::video::pipeline::VideoConfig;
    use crate::video::types::PixelFormat;

    /// Borrowed I420 view satisfying the OpenH264 source contract.
    struct I420View<'a> {
        width: usize,
        height: usize,
        data: &'a [u8],
    }

    impl YUVSource for I420View<'_> {
        fn dimensions(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn strides(&self) -> (usize, usize, usize) {
            (self.width, self.width / 2, self.width / 2)
        }

        fn y(&self) -> &[u8] {
            &self.data[..self.width * self.height]
        }

        fn u(&self) -> &[u8] {
            let y = self.width * self.height;
            &self.data[y..y + y / 4]
        }

        fn v(&self) -> &[u8] {
            let y = self.width * self.height;
            &self.data[y + y / 4..y + y / 2]
        }
    }

    /// H264 encoder backed by OpenH264.
    pub struct OpenH264Encoder {
        encoder: Encoder,
    }

    impl OpenH264Encoder {
        pub fn new(config: &VideoConfig) -> Result<Self, ClientError> {
            config.validate()?;
            // Rate control is left at the library defaults; dimensions
            // are taken per-frame from the YUV source.
            let encoder = Encoder::with_api_config(OpenH264API::from_source(), EncoderConfig::new())
                .map_err(|e| ClientError::Configuration(format!("openh264 init failed: {e}")))?;
            Ok(Self { encoder })
        }
    }

    impl VideoEncoder for OpenH264Encoder {
        fn encode(&mut self, frame: &RawFrame) -> Result<Vec<EncodedChunk>, ClientError> {
            if frame.buffer.format != PixelFormat::I420 {
                return Err(ClientError::Configuration(format!(
                    "openh264 expects I420 input, got {:?}",
                    frame.buffer.format
                )));
            }
            let view = I420View {
                width: frame.buffer.width as usize,
                height: frame.buffer.height as usize,
                data: &frame.buffer.data,
            };
            let bitstream = self
                .encoder
                .encode(&view)
                .map_err(|e| ClientError::Other(format!("openh264 encode failed: {e}")))?;
            let data = bitstream.to_vec();
            if data.is_empty() {
                return Ok(Vec::new());
            }
            // OpenH264 runs zero-lookahead: output corresponds to the
            // frame just fed in.
            Ok(vec![EncodedChunk {
                data: Bytes::from(data),
                timestamp_ns: frame.timestamp_ns,
                keyframe: frame.sequence == 0,
            }])
        }

        fn flush(&mut self) -> Result<Vec<EncodedChunk>, ClientError> {
            Ok(Vec::new())
        }
    }
}

#[cfg(feature = "openh264")]
pub use openh264_impl::OpenH264Encoder;

// ── Test helpers ─────────────────────────────────────────────────
