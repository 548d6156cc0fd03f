//! Client façade.
//!
//! [`NetAppClient`] owns one transport connection, one set of
//! registered channels, and at most one video pipeline. Applications
//! construct it with their inbound callbacks, connect, and then use
//! `send_data` / `send_image`; results arrive on the drain task through
//! the registered handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{CallbackInfo, ChannelType};
use crate::codec::{CodecRegistry, Payload, jpeg};
use crate::envelope::now_ns;
use crate::error::{ClientError, CodecError};
use crate::mux::ChannelMultiplexer;
use crate::network::{Connection, ConnectionInfo};
use crate::video::capture::FrameSource;
use crate::video::encode::{EncodedChunk, VideoEncoder};
use crate::video::pipeline::{H264Pipeline, VideoConfig};
use crate::video::streamer::VideoStreamer;
use crate::video::types::RawFrame;

// ── JpegOptions ──────────────────────────────────────────────────

/// Options for direct still-image sends.
#[derive(Debug, Clone)]
pub struct JpegOptions {
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            quality: jpeg::DEFAULT_QUALITY,
        }
    }
}

// ── NetAppClient ─────────────────────────────────────────────────

struct VideoSession {
    channel: String,
    /// Present in push mode; `send_image` feeds it.
    pipeline: Option<H264Pipeline>,
    /// Present in pull mode.
    streamer_stop: Option<Arc<AtomicBool>>,
    streamer_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    connected: bool,
    drain: Option<JoinHandle<()>>,
    video: Option<VideoSession>,
}

/// Client of a remote NetApp over one persistent connection.
pub struct NetAppClient {
    mux: Arc<ChannelMultiplexer>,
    inner: Mutex<Inner>,
}

impl NetAppClient {
    /// Create a client with its inbound channel registrations.
    pub fn new(callbacks: HashMap<String, CallbackInfo>) -> Result<Self, ClientError> {
        Self::with_registry(CodecRegistry::with_defaults(), callbacks)
    }

    /// Create a client with an explicit codec registry.
    pub fn with_registry(
        registry: CodecRegistry,
        callbacks: HashMap<String, CallbackInfo>,
    ) -> Result<Self, ClientError> {
        let mux = Arc::new(ChannelMultiplexer::new(registry));
        for (name, info) in callbacks {
            let channel_type = info.channel_type();
            mux.register_channel(&name, channel_type, Some(info.into_handler()))?;
        }
        Ok(Self {
            mux,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Register a further inbound callback (before or after connect).
    pub fn register_callback(&self, name: &str, info: CallbackInfo) -> Result<(), ClientError> {
        let channel_type = info.channel_type();
        self.mux
            .register_channel(name, channel_type, Some(info.into_handler()))
    }

    /// The underlying multiplexer.
    pub fn multiplexer(&self) -> &Arc<ChannelMultiplexer> {
        &self.mux
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Establish the transport connection.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] on repeat and
    /// [`ClientError::Timeout`] when the dial exceeds `timeout`.
    pub async fn connect(
        &self,
        info: &ConnectionInfo,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.connected {
            return Err(ClientError::AlreadyConnected);
        }
        let connection = tokio::time::timeout(timeout, Connection::connect(info))
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;
        self.attach(&mut inner, connection);
        info!(endpoint = %info, "connected");
        Ok(())
    }

    /// Attach an already-established bidirectional stream (tests, or a
    /// transport dialed by other means).
    pub async fn connect_stream<S>(&self, stream: S) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.connected {
            return Err(ClientError::AlreadyConnected);
        }
        self.attach(&mut inner, Connection::new(stream));
        Ok(())
    }

    fn attach(&self, inner: &mut Inner, connection: Connection) {
        let (sender, inbound) = connection.into_parts();
        self.mux.attach(sender);
        inner.drain = Some(tokio::spawn(Arc::clone(&self.mux).run_drain(inbound)));
        inner.connected = true;
    }

    /// Tear down the transport, stopping any running video pipeline.
    /// Safe to call multiple times.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut session) = inner.video.take() {
            Self::shutdown_video(&mut session).await;
        }
        self.mux.detach();
        if let Some(drain) = inner.drain.take() {
            drain.abort();
        }
        if inner.connected {
            inner.connected = false;
            debug!("disconnected");
        }
    }

    /// Whether the client currently holds a connection.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    // ── Send operations ──────────────────────────────────────────

    /// Generic structured-value send (JSON family).
    ///
    /// The channel is registered on first use; a later call with a
    /// different type fails.
    pub async fn send_data(
        &self,
        value: serde_json::Value,
        channel: &str,
        channel_type: ChannelType,
    ) -> Result<(), ClientError> {
        if !channel_type.is_json() {
            return Err(CodecError::EncodingMismatch {
                channel_type,
                payload: "json",
            }
            .into());
        }
        self.ensure_outbound(channel, channel_type)?;
        self.mux
            .send(channel, &Payload::Json(value), None, None)
            .await
    }

    /// Send one image frame.
    ///
    /// JPEG channels encode and send immediately; H264 channels push
    /// the frame into the running video pipeline instead (deferred,
    /// asynchronous delivery through the encoder).
    pub async fn send_image(
        &self,
        frame: &RawFrame,
        channel: &str,
        channel_type: ChannelType,
        timestamp_ns: Option<u64>,
        options: Option<JpegOptions>,
        metadata: Option<String>,
    ) -> Result<(), ClientError> {
        match channel_type {
            ChannelType::Jpeg => {
                self.ensure_outbound(channel, ChannelType::Jpeg)?;
                let ts = timestamp_ns.unwrap_or(if frame.timestamp_ns != 0 {
                    frame.timestamp_ns
                } else {
                    now_ns()
                });
                match options {
                    None => {
                        self.mux
                            .send(
                                channel,
                                &Payload::Image(frame.buffer.clone()),
                                Some(ts),
                                metadata,
                            )
                            .await
                    }
                    Some(opts) => {
                        let bytes = jpeg::encode_with_quality(&frame.buffer, opts.quality)?;
                        self.mux.send_raw(channel, bytes, Some(ts), metadata).await
                    }
                }
            }
            ChannelType::H264 => {
                let inner = self.inner.lock().await;
                let Some(session) = &inner.video else {
                    return Err(ClientError::Configuration(
                        "no video pipeline running for H264 send".into(),
                    ));
                };
                if session.channel != channel {
                    return Err(ClientError::Configuration(format!(
                        "video pipeline is bound to channel {:?}, not {:?}",
                        session.channel, channel
                    )));
                }
                let Some(pipeline) = &session.pipeline else {
                    return Err(ClientError::Configuration(
                        "video pipeline is source-driven; pushes are not accepted".into(),
                    ));
                };
                let mut frame = frame.clone();
                if let Some(ts) = timestamp_ns {
                    frame.timestamp_ns = ts;
                }
                pipeline.push_frame(frame).await
            }
            other => Err(CodecError::EncodingMismatch {
                channel_type: other,
                payload: "image",
            }
            .into()),
        }
    }

    /// Send an already-encoded image payload, bypassing the pixel
    /// codec.
    pub async fn send_encoded_image(
        &self,
        bytes: Bytes,
        channel: &str,
        channel_type: ChannelType,
        timestamp_ns: u64,
        metadata: Option<String>,
    ) -> Result<(), ClientError> {
        if !channel_type.is_image() {
            return Err(CodecError::EncodingMismatch {
                channel_type,
                payload: "image",
            }
            .into());
        }
        self.ensure_outbound(channel, channel_type)?;
        self.mux
            .send_raw(channel, bytes, Some(timestamp_ns), metadata)
            .await
    }

    fn ensure_outbound(&self, name: &str, channel_type: ChannelType) -> Result<(), ClientError> {
        match self.mux.channel_type(name) {
            Some(existing) if existing == channel_type => Ok(()),
            Some(_) => Err(ClientError::DuplicateChannel(name.to_string())),
            None => self.mux.register_channel(name, channel_type, None),
        }
    }

    // ── Video pipeline ───────────────────────────────────────────

    /// Start a push-model H264 pipeline bound to `channel`; feed it
    /// with [`send_image`](Self::send_image).
    pub async fn start_video(
        &self,
        channel: &str,
        config: VideoConfig,
        encoder: Box<dyn VideoEncoder>,
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.video.is_some() {
            return Err(ClientError::Configuration(
                "a video pipeline is already running".into(),
            ));
        }
        self.ensure_outbound(channel, ChannelType::H264)?;

        let mut pipeline = H264Pipeline::new(config, encoder)?;
        let chunks = pipeline.start()?;
        let forward = self.spawn_forwarder(channel.to_string(), chunks);

        inner.video = Some(VideoSession {
            channel: channel.to_string(),
            pipeline: Some(pipeline),
            streamer_stop: None,
            streamer_task: None,
            forward_task: Some(forward),
        });
        Ok(())
    }

    /// Stream a frame source end-to-end (pull model): capture → encode
    /// → H264 channel, paced at the source's rate.
    pub async fn stream_source(
        &self,
        channel: &str,
        config: VideoConfig,
        encoder: Box<dyn VideoEncoder>,
        source: Box<dyn FrameSource>,
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.video.is_some() {
            return Err(ClientError::Configuration(
                "a video pipeline is already running".into(),
            ));
        }
        self.ensure_outbound(channel, ChannelType::H264)?;

        let mut pipeline = H264Pipeline::new(config, encoder)?;
        let chunks = pipeline.start()?;
        let forward = self.spawn_forwarder(channel.to_string(), chunks);

        let mut streamer = VideoStreamer::new(source, pipeline)?;
        let stop = streamer.stop_handle();
        let task = tokio::spawn(async move {
            if let Err(e) = streamer.run().await {
                warn!(error = %e, "video streamer stopped with error");
            }
        });

        inner.video = Some(VideoSession {
            channel: channel.to_string(),
            pipeline: None,
            streamer_stop: Some(stop),
            streamer_task: Some(task),
            forward_task: Some(forward),
        });
        Ok(())
    }

    /// Stop the running video pipeline, flushing buffered chunks.
    /// A no-op when nothing is running.
    pub async fn stop_video(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut session) = inner.video.take() {
            Self::shutdown_video(&mut session).await;
        }
    }

    fn spawn_forwarder(
        &self,
        channel: String,
        mut chunks: mpsc::Receiver<EncodedChunk>,
    ) -> JoinHandle<()> {
        let mux = Arc::clone(&self.mux);
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if let Err(e) = mux
                    .send(&channel, &Payload::H264(chunk.data), Some(chunk.timestamp_ns), None)
                    .await
                {
                    // No silent loss: a chunk that cannot be sent is
                    // reported as failed.
                    warn!(channel = %channel, error = %e, "failed to send encoded chunk");
                }
            }
        })
    }

    async fn shutdown_video(session: &mut VideoSession) {
        if let Some(stop) = &session.streamer_stop {
            stop.store(false, Ordering::SeqCst);
        }
        if let Some(task) = session.streamer_task.take() {
            let _ = task.await;
        }
        if let Some(pipeline) = session.pipeline.as_mut() {
            pipeline.stop().await;
        }
        // The forwarder drains remaining chunks, then its channel
        // closes.
        if let Some(forward) = session.forward_task.take() {
            let _ = forward.await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> NetAppClient {
        NetAppClient::new(HashMap::new()).unwrap()
    }

    #[tokio::test]
    async fn send_before_connect_fails_with_not_connected() {
        let c = client();
        let result = c.send_data(json!({"x": 1}), "json", ChannelType::Json).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn connect_is_idempotent_guarded() {
        let c = client();
        let (a, _b) = tokio::io::duplex(1024);
        c.connect_stream(a).await.unwrap();
        assert!(c.is_connected().await);

        let (a2, _b2) = tokio::io::duplex(1024);
        let result = c.connect_stream(a2).await;
        assert!(matches!(result, Err(ClientError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn disconnect_is_safe_to_repeat() {
        let c = client();
        let (a, _b) = tokio::io::duplex(1024);
        c.connect_stream(a).await.unwrap();

        c.disconnect().await;
        assert!(!c.is_connected().await);
        c.disconnect().await; // second call is a no-op

        // Sends after disconnect observe the torn-down transport.
        let result = c.send_data(json!(1), "json", ChannelType::Json).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn send_data_rejects_non_json_channel_types() {
        let c = client();
        let result = c.send_data(json!(1), "image", ChannelType::H264).await;
        assert!(matches!(
            result,
            Err(ClientError::Codec(CodecError::EncodingMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn outbound_channel_type_cannot_be_rebound() {
        let c = client();
        let (a, _b) = tokio::io::duplex(64 * 1024);
        c.connect_stream(a).await.unwrap();

        c.send_data(json!(1), "data", ChannelType::Json).await.unwrap();
        let result = c.send_data(json!(1), "data", ChannelType::JsonLz4).await;
        assert!(matches!(result, Err(ClientError::DuplicateChannel(_))));
    }

    #[tokio::test]
    async fn h264_send_without_pipeline_is_a_configuration_error() {
        let c = client();
        let (a, _b) = tokio::io::duplex(1024);
        c.connect_stream(a).await.unwrap();

        let buffer = crate::video::types::PixelBuffer::new(
            8,
            8,
            crate::video::types::PixelFormat::Rgb8,
            vec![0u8; 8 * 8 * 3],
        )
        .unwrap();
        let frame = RawFrame {
            buffer,
            timestamp_ns: 1,
            sequence: 0,
        };
        let result = c
            .send_image(&frame, "image", ChannelType::H264, None, None, None)
            .await;
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }
}
