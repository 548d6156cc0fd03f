//! Frame sources.
//!
//! A [`FrameSource`] produces a sequence of raw frames with capture
//! timestamps and gapless sequence numbers. The two built-in sources
//! cover file playback (YUV4MPEG2) and a synthetic test pattern; a live
//! camera is any external implementation of the same trait — the
//! streaming loop never cares where frames come from.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bytes::Bytes;

use crate::envelope::now_ns;
use crate::error::ClientError;
use crate::video::types::{PixelBuffer, PixelFormat, RawFrame};

// ── FrameSource ──────────────────────────────────────────────────

/// Producer of raw frames.
///
/// `next_frame` may block (file reads, device waits); call it from a
/// context that tolerates blocking.
pub trait FrameSource: Send {
    /// Produce the next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, ClientError>;

    /// Frame width in pixels.
    fn width(&self) -> u32;

    /// Frame height in pixels.
    fn height(&self) -> u32;

    /// Nominal frames per second.
    fn fps(&self) -> f64;
}

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic moving-gradient source, useful for demos and tests.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps: f64,
    format: PixelFormat,
    sequence: u64,
    frame_limit: Option<u64>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Result<Self, ClientError> {
        if width == 0 || height == 0 {
            return Err(ClientError::Configuration(
                "test pattern dimensions must be non-zero".into(),
            ));
        }
        if !(fps > 0.0) {
            return Err(ClientError::Configuration(
                "test pattern fps must be positive".into(),
            ));
        }
        Ok(Self {
            width,
            height,
            fps,
            format: PixelFormat::Rgb8,
            sequence: 0,
            frame_limit: None,
        })
    }

    /// Produce I420 frames instead of Rgb8 (requires even dimensions).
    pub fn with_format(mut self, format: PixelFormat) -> Result<Self, ClientError> {
        if format == PixelFormat::I420 && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(ClientError::Configuration(
                "I420 requires even dimensions".into(),
            ));
        }
        self.format = format;
        Ok(self)
    }

    /// Stop after `limit` frames (end of stream).
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn render(&self) -> Bytes {
        let shift = (self.sequence % 256) as u8;
        let mut data = Vec::with_capacity(self.format.frame_size(self.width, self.height));
        match self.format {
            PixelFormat::Rgb8 => {
                for y in 0..self.height {
                    for x in 0..self.width {
                        data.push((x as u8).wrapping_add(shift));
                        data.push(y as u8);
                        data.push(shift);
                    }
                }
            }
            PixelFormat::Bgra8 => {
                for y in 0..self.height {
                    for x in 0..self.width {
                        data.push(shift);
                        data.push(y as u8);
                        data.push((x as u8).wrapping_add(shift));
                        data.push(0xFF);
                    }
                }
            }
            PixelFormat::I420 => {
                for y in 0..self.height {
                    for x in 0..self.width {
                        data.push(((x + y) as u8).wrapping_add(shift));
                    }
                }
                let chroma = (self.width / 2 * self.height / 2) as usize;
                data.extend(std::iter::repeat(128u8.wrapping_add(shift)).take(chroma));
                data.extend(std::iter::repeat(128u8.wrapping_sub(shift)).take(chroma));
            }
        }
        Bytes::from(data)
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, ClientError> {
        if let Some(limit) = self.frame_limit {
            if self.sequence >= limit {
                return Ok(None);
            }
        }
        let buffer = PixelBuffer::new(self.width, self.height, self.format, self.render())?;
        let frame = RawFrame {
            buffer,
            timestamp_ns: now_ns(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

// ── Y4mFileSource ────────────────────────────────────────────────

/// YUV4MPEG2 file reader yielding I420 frames.
///
/// The format is the standard raw-video interchange: a single header
/// line (`YUV4MPEG2 W<w> H<h> F<num>:<den> ...`) followed by `FRAME`
/// markers, each carrying one uncompressed 4:2:0 picture.
pub struct Y4mFileSource {
    reader: BufReader<File>,
    width: u32,
    height: u32,
    fps: f64,
    sequence: u64,
}

impl Y4mFileSource {
    /// Open and parse the stream header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);

        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;
        let header = String::from_utf8(header)?;
        let mut tokens = header.trim_end().split(' ');

        if tokens.next() != Some("YUV4MPEG2") {
            return Err(ClientError::InvalidHeader("not a YUV4MPEG2 stream"));
        }

        let mut width = 0u32;
        let mut height = 0u32;
        let mut fps = 0.0f64;
        for token in tokens {
            if token.is_empty() {
                continue;
            }
            match token.split_at(1) {
                ("W", value) => {
                    width = value
                        .parse()
                        .map_err(|_| ClientError::InvalidHeader("bad y4m width"))?;
                }
                ("H", value) => {
                    height = value
                        .parse()
                        .map_err(|_| ClientError::InvalidHeader("bad y4m height"))?;
                }
                ("F", value) => {
                    let (num, den) = value
                        .split_once(':')
                        .ok_or(ClientError::InvalidHeader("bad y4m frame rate"))?;
                    let num: f64 = num
                        .parse()
                        .map_err(|_| ClientError::InvalidHeader("bad y4m frame rate"))?;
                    let den: f64 = den
                        .parse()
                        .map_err(|_| ClientError::InvalidHeader("bad y4m frame rate"))?;
                    if den > 0.0 {
                        fps = num / den;
                    }
                }
                ("C", value) => {
                    if !value.starts_with("420") {
                        return Err(ClientError::Configuration(format!(
                            "unsupported y4m colourspace C{value} (only 4:2:0)"
                        )));
                    }
                }
                _ => {} // interlacing / aspect tags are irrelevant here
            }
        }

        if width == 0 || height == 0 {
            return Err(ClientError::InvalidHeader("y4m header missing dimensions"));
        }
        if fps <= 0.0 {
            fps = 25.0; // y4m default when the F tag is absent
        }

        Ok(Self {
            reader,
            width,
            height,
            fps,
            sequence: 0,
        })
    }
}

impl FrameSource for Y4mFileSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, ClientError> {
        let mut marker = Vec::new();
        let read = self.reader.read_until(b'\n', &mut marker)?;
        if read == 0 {
            return Ok(None); // end of stream
        }
        if !marker.starts_with(b"FRAME") {
            return Err(ClientError::InvalidHeader("malformed y4m frame marker"));
        }

        let size = PixelFormat::I420.frame_size(self.width, self.height);
        let mut data = vec![0u8; size];
        self.reader.read_exact(&mut data)?;

        let buffer = PixelBuffer::new(self.width, self.height, PixelFormat::I420, data)?;
        let frame = RawFrame {
            buffer,
            timestamp_ns: now_ns(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_pattern_sequence_is_gapless() {
        let mut source = TestPatternSource::new(8, 8, 30.0).unwrap().with_limit(5);
        let mut sequences = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.buffer.width, 8);
            assert_eq!(frame.buffer.format, PixelFormat::Rgb8);
            assert!(frame.timestamp_ns > 0);
            sequences.push(frame.sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pattern_i420_needs_even_dimensions() {
        let result = TestPatternSource::new(7, 8, 30.0)
            .unwrap()
            .with_format(PixelFormat::I420);
        assert!(matches!(result, Err(ClientError::Configuration(_))));

        let mut source = TestPatternSource::new(8, 8, 30.0)
            .unwrap()
            .with_format(PixelFormat::I420)
            .unwrap()
            .with_limit(1);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.buffer.data.len(), 8 * 8 * 3 / 2);
    }

    #[test]
    fn test_pattern_rejects_zero_config() {
        assert!(TestPatternSource::new(0, 8, 30.0).is_err());
        assert!(TestPatternSource::new(8, 8, 0.0).is_err());
    }

    fn temp_y4m(name: &str, contents: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("edgelink-{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn y4m_reads_frames() {
        let mut contents = b"YUV4MPEG2 W4 H2 F30:1 Ip A1:1 C420jpeg\n".to_vec();
        let frame_size = PixelFormat::I420.frame_size(4, 2);
        for i in 0..3u8 {
            contents.extend_from_slice(b"FRAME\n");
            contents.extend(std::iter::repeat(i).take(frame_size));
        }
        let path = temp_y4m("frames.y4m", &contents);

        let mut source = Y4mFileSource::open(&path).unwrap();
        assert_eq!(source.width(), 4);
        assert_eq!(source.height(), 2);
        assert!((source.fps() - 30.0).abs() < f64::EPSILON);

        let mut count = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.buffer.format, PixelFormat::I420);
            assert_eq!(frame.buffer.data.len(), frame_size);
            assert_eq!(frame.sequence, count);
            count += 1;
        }
        assert_eq!(count, 3);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn y4m_rejects_foreign_header() {
        let path = temp_y4m("bad.y4m", b"RIFFxxxx\n");
        let result = Y4mFileSource::open(&path);
        assert!(matches!(result, Err(ClientError::InvalidHeader(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn y4m_rejects_non_420() {
        let path = temp_y4m("c444.y4m", b"YUV4MPEG2 W4 H2 F30:1 C444\n");
        let result = Y4mFileSource::open(&path);
        assert!(matches!(result, Err(ClientError::Configuration(_))));
        std::fs::remove_file(path).ok();
    }
}
