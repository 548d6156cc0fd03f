//! Shared frame types used between the capture, encode, and codec
//! stages.
//!
//! These are **internal** pixel representations; the serialisable wire
//! type is [`crate::envelope::Envelope`].

use bytes::Bytes;

use crate::error::ClientError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// Planar YUV 4:2:0 — full-res Y plane, quarter-res U and V planes.
    I420,
}

impl PixelFormat {
    /// Exact byte size of one `width` × `height` frame in this format.
    pub const fn frame_size(self, width: u32, height: u32) -> usize {
        let px = width as usize * height as usize;
        match self {
            PixelFormat::Rgb8 => px * 3,
            PixelFormat::Bgra8 => px * 4,
            PixelFormat::I420 => px + px / 2,
        }
    }
}

// ── PixelBuffer ──────────────────────────────────────────────────

/// An uncompressed image: dimensions, layout, and tightly packed pixel
/// data (no row padding).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Pixel data — exactly `format.frame_size(width, height)` bytes.
    pub data: Bytes,
}

impl PixelBuffer {
    /// Build a pixel buffer, validating the size law.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, ClientError> {
        let data = data.into();
        let expected = format.frame_size(width, height);
        if data.len() != expected {
            return Err(ClientError::Configuration(format!(
                "pixel buffer size mismatch: {} bytes for {}x{} {:?} (expected {})",
                data.len(),
                width,
                height,
                format,
                expected,
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// A raw captured frame with its capture timestamp and sequence number.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// The pixels.
    pub buffer: PixelBuffer,
    /// Capture timestamp in nanoseconds since the Unix epoch.
    /// A zero timestamp is stamped on pipeline entry.
    pub timestamp_ns: u64,
    /// Monotonically increasing and gapless within one source lifetime.
    pub sequence: u64,
}
