//! H264 encode pipeline.
//!
//! ```text
//!  (construction)        start()            stop() / fault
//!  ─────────────► Configured ──► Streaming ──► Stopped
//! ```
//!
//! Push model: the caller feeds frames in; a worker task drives the
//! encoder and emits chunks on a bounded channel in emission order.
//! Construction validates the configuration (the UNINITIALIZED →
//! CONFIGURED edge); `stop` drains the encoder's buffered output before
//! the Stopped transition, after which nothing more is emitted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::envelope::now_ns;
use crate::error::ClientError;
use crate::video::encode::{EncodedChunk, VideoEncoder};
use crate::video::types::RawFrame;

/// Bound of the pending-frame and pending-chunk queues.
const QUEUE_DEPTH: usize = 32;

// ── VideoConfig ──────────────────────────────────────────────────

/// Encode pipeline configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame width in pixels (even, for 4:2:0 subsampling).
    pub width: u32,
    /// Frame height in pixels (even, for 4:2:0 subsampling).
    pub height: u32,
    /// Target frames per second (0 < fps <= 240).
    pub fps: f64,
    /// Target bitrate in bits/second.
    pub bitrate_bps: u32,
    /// Prefer low end-to-end latency over compression efficiency.
    pub low_latency: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            bitrate_bps: 2_000_000,
            low_latency: true,
        }
    }
}

impl VideoConfig {
    /// Reject mutually inconsistent parameters.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.width == 0 || self.height == 0 {
            return Err(ClientError::Configuration(
                "frame dimensions must be non-zero".into(),
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ClientError::Configuration(format!(
                "{}x{} is not encodable with 4:2:0 subsampling (dimensions must be even)",
                self.width, self.height
            )));
        }
        if !(self.fps > 0.0) || self.fps > 240.0 {
            return Err(ClientError::Configuration(format!(
                "frame rate {} out of range (0, 240]",
                self.fps
            )));
        }
        if self.bitrate_bps == 0 {
            return Err(ClientError::Configuration(
                "bitrate must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ── PipelineState ────────────────────────────────────────────────

/// Observable pipeline phase.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed and validated; not yet consuming frames.
    Configured = 0,
    /// Consuming frames and emitting chunks.
    Streaming = 1,
    /// Halted by `stop` or a fault. Terminal.
    Stopped = 2,
}

impl TryFrom<u8> for PipelineState {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PipelineState::Configured),
            1 => Ok(PipelineState::Streaming),
            2 => Ok(PipelineState::Stopped),
            _ => Err(ClientError::UnknownVariant {
                type_name: "PipelineState",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Configured => write!(f, "Configured"),
            PipelineState::Streaming => write!(f, "Streaming"),
            PipelineState::Stopped => write!(f, "Stopped"),
        }
    }
}

// ── H264Pipeline ─────────────────────────────────────────────────

/// Push-model encode pipeline feeding an H264 channel.
pub struct H264Pipeline {
    config: VideoConfig,
    state: Arc<AtomicU8>,
    encoder: Option<Box<dyn VideoEncoder>>,
    frame_tx: Option<mpsc::Sender<RawFrame>>,
    worker: Option<JoinHandle<()>>,
}

impl H264Pipeline {
    /// Construct a configured pipeline.
    pub fn new(config: VideoConfig, encoder: Box<dyn VideoEncoder>) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(AtomicU8::new(PipelineState::Configured as u8)),
            encoder: Some(encoder),
            frame_tx: None,
            worker: None,
        })
    }

    /// Current phase.
    pub fn state(&self) -> PipelineState {
        PipelineState::try_from(self.state.load(Ordering::SeqCst))
            .unwrap_or(PipelineState::Stopped)
    }

    /// The validated configuration.
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Begin streaming. Returns the chunk stream, delivered in emission
    /// order.
    pub fn start(&mut self) -> Result<mpsc::Receiver<EncodedChunk>, ClientError> {
        if self.state() != PipelineState::Configured {
            return Err(ClientError::Configuration(
                "pipeline has already been started".into(),
            ));
        }
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| ClientError::Configuration("pipeline has already been started".into()))?;

        let (frame_tx, mut frame_rx) = mpsc::channel::<RawFrame>(QUEUE_DEPTH);
        let (chunk_tx, chunk_rx) = mpsc::channel::<EncodedChunk>(QUEUE_DEPTH);
        let state = Arc::clone(&self.state);
        state.store(PipelineState::Streaming as u8, Ordering::SeqCst);

        let worker = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                match encoder.encode(&frame) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            if chunk_tx.send(chunk).await.is_err() {
                                debug!("chunk receiver dropped — stopping pipeline");
                                state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "encoder fault — stopping pipeline");
                        state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
                        return;
                    }
                }
            }

            // Frame channel closed: explicit stop. Drain the encoder
            // before the Stopped transition so nothing is emitted after
            // it becomes observable.
            match encoder.flush() {
                Ok(chunks) => {
                    for chunk in chunks {
                        if chunk_tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => error!(error = %e, "encoder flush failed"),
            }
            state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
        });

        self.frame_tx = Some(frame_tx);
        self.worker = Some(worker);
        Ok(chunk_rx)
    }

    /// Push one frame into the pipeline.
    ///
    /// Frames with a zero timestamp are stamped on entry. Fails with
    /// [`ClientError::PipelineStopped`] whenever the pipeline is not
    /// streaming — before `start`, after `stop`, or after a fault.
    pub async fn push_frame(&self, mut frame: RawFrame) -> Result<(), ClientError> {
        if self.state() != PipelineState::Streaming {
            return Err(ClientError::PipelineStopped);
        }
        if frame.buffer.width != self.config.width || frame.buffer.height != self.config.height {
            return Err(ClientError::Configuration(format!(
                "frame is {}x{}, pipeline configured for {}x{}",
                frame.buffer.width, frame.buffer.height, self.config.width, self.config.height
            )));
        }
        if frame.timestamp_ns == 0 {
            frame.timestamp_ns = now_ns();
        }
        let tx = self.frame_tx.as_ref().ok_or(ClientError::PipelineStopped)?;
        tx.send(frame)
            .await
            .map_err(|_| ClientError::PipelineStopped)
    }

    /// Stop streaming: flush buffered chunks, then halt. Idempotent.
    pub async fn stop(&mut self) {
        self.frame_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.state
            .store(PipelineState::Stopped as u8, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────
