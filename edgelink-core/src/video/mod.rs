//! Video capture and encode pipeline.
//!
//! ```text
//! FrameSource ──► H264Pipeline ──► EncodedChunk stream ──► ChannelMultiplexer
//!  (capture)        (encode)         (correlation ts)         (H264 channel)
//! ```
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `types`    | Shared frame / pixel types used across the pipeline |
//! | `capture`  | Frame sources: Y4M file playback, synthetic pattern |
//! | `encode`   | Encoder seam (`VideoEncoder`) + OpenH264 (feature)  |
//! | `pipeline` | Push-model encode pipeline with state machine       |
//! | `streamer` | Pull-model loop wrapping a source                   |

pub mod capture;
pub mod encode;
pub mod pipeline;
pub mod streamer;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use capture::{FrameSource, TestPatternSource, Y4mFileSource};
pub use encode::{EncodedChunk, VideoEncoder};
pub use pipeline::{H264Pipeline, PipelineState, VideoConfig};
pub use streamer::VideoStreamer;
pub use types::{PixelBuffer, PixelFormat, RawFrame};

#[cfg(feature = "openh264")]
pub use encode::OpenH264Encoder;
