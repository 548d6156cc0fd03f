//! Domain-specific error types for the edgelink client runtime.
//!
//! All fallible operations return `Result<T, ClientError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

use crate::channel::ChannelType;
use crate::video::types::PixelFormat;

/// The canonical error type for the client runtime.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Channel errors ───────────────────────────────────────────
    /// The channel name is already bound to a different type.
    #[error("channel {0:?} is already bound to a different type")]
    DuplicateChannel(String),

    /// No channel with this name has been registered.
    #[error("channel {0:?} is not registered")]
    UnknownChannel(String),

    // ── Connection errors ────────────────────────────────────────
    /// The transport is not established (or has gone away).
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection is already up.
    #[error("already connected")]
    AlreadyConnected,

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Wire errors ──────────────────────────────────────────────
    /// Received bytes that do not start with the envelope magic.
    #[error("invalid magic bytes: expected EDL1")]
    InvalidMagic,

    /// A field in the envelope header could not be parsed.
    #[error("invalid envelope header: {0}")]
    InvalidHeader(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The wire frame exceeds the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Codec errors ─────────────────────────────────────────────
    /// Encoding or decoding of a channel payload failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // ── Pipeline errors ──────────────────────────────────────────
    /// Channel, source, or pipeline parameters are inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The encode pipeline is not streaming; the push was rejected.
    #[error("pipeline is stopped")]
    PipelineStopped,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── CodecError ───────────────────────────────────────────────────

/// Per-message encode/decode failure.
///
/// Contained within the multiplexer: an inbound payload that fails to
/// decode is routed to the channel's error callback with this reason,
/// and never tears down the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload variant does not match the channel's declared type.
    #[error("cannot encode a {payload} payload on a {channel_type} channel")]
    EncodingMismatch {
        channel_type: ChannelType,
        payload: &'static str,
    },

    /// JSON serialization or parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A compressed block is truncated or corrupt.
    #[error("corrupt compressed block: {0}")]
    Corrupt(String),

    /// The payload does not match the checksum carried in the envelope.
    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    /// The envelope declares a different type than the registration.
    #[error("envelope declares {declared}, channel is registered as {registered}")]
    TypeMismatch {
        declared: ChannelType,
        registered: ChannelType,
    },

    /// Slice data arrived before the SPS/PPS parameter sets.
    #[error("slice data received before SPS/PPS parameter sets")]
    MissingParameterSets,

    /// The H264 bitstream fragment is structurally invalid.
    #[error("invalid h264 bitstream: {0}")]
    InvalidBitstream(&'static str),

    /// The pixel format cannot be handled by this codec.
    #[error("unsupported pixel format {0:?} for this codec")]
    UnsupportedPixelFormat(PixelFormat),

    /// The image codec library reported an error.
    #[error("image codec error: {0}")]
    Image(String),

    /// No codec is registered for this channel type.
    #[error("no codec registered for channel type {0}")]
    Unsupported(ChannelType),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ClientError {
    fn from(s: String) -> Self {
        ClientError::Other(s)
    }
}

impl From<&str> for ClientError {
    fn from(s: &str) -> Self {
        ClientError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ClientError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ClientError::ChannelClosed
    }
}

impl From<lz4_flex::block::DecompressError> for CodecError {
    fn from(e: lz4_flex::block::DecompressError) -> Self {
        CodecError::Corrupt(e.to_string())
    }
}

impl From<image::ImageError> for CodecError {
    fn from(e: image::ImageError) -> Self {
        CodecError::Image(e.to_string())
    }
}
