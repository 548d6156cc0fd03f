//! # edgelink-core
//!
//! Client-side runtime connecting an edge device (camera, video file,
//! or arbitrary sensor) to a remote compute service ("NetApp") over a
//! persistent bidirectional connection. Outbound data travels on
//! typed, named channels multiplexed over the one connection; results
//! come back asynchronously to registered handlers.
//!
//! This crate contains:
//! - **Channels**: `ChannelType`, `CallbackInfo`, `ChannelHandler`
//! - **Wire**: `Envelope` + `EnvelopeCodec` for framed transport I/O
//!   via `tokio_util`
//! - **Codecs**: `CodecRegistry` / `Payload` — JSON, JSON_LZ4, JPEG,
//!   and stateful H264
//! - **Network**: `Connection` for managed connections with a single
//!   writer task
//! - **Multiplexer**: `ChannelMultiplexer` — register/send/dispatch
//! - **Video**: `FrameSource` capture, `H264Pipeline` encode state
//!   machine, `VideoStreamer` pull loop
//! - **Client**: `NetAppClient` — the façade applications consume
//! - **Error**: `ClientError` / `CodecError` — typed, `thiserror`-based
//!   hierarchy

pub mod channel;
pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod mux;
pub mod network;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use channel::{CallbackInfo, ChannelHandler, ChannelType};
pub use client::{JpegOptions, NetAppClient};
pub use codec::{CodecRegistry, Payload, PayloadDecoder};
pub use envelope::{Envelope, EnvelopeCodec, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use error::{ClientError, CodecError};
pub use mux::ChannelMultiplexer;
pub use network::{Connection, ConnectionInfo, ConnectionSender};
pub use video::{
    EncodedChunk, FrameSource, H264Pipeline, PipelineState, PixelBuffer, PixelFormat, RawFrame,
    TestPatternSource, VideoConfig, VideoEncoder, VideoStreamer, Y4mFileSource,
};

#[cfg(feature = "openh264")]
pub use video::OpenH264Encoder;
