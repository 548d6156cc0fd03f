//! Pull-model video streamer.
//!
//! Wraps a [`FrameSource`] and drives a started [`H264Pipeline`] at the
//! source's nominal rate. This is the counterpart to the push model:
//! instead of the application feeding frames in, the streamer pulls
//! them from a capture source until end-of-stream or an explicit stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ClientError;
use crate::video::capture::FrameSource;
use crate::video::pipeline::{H264Pipeline, PipelineState};

/// Drives frames from a source into an encode pipeline.
pub struct VideoStreamer {
    source: Box<dyn FrameSource>,
    pipeline: H264Pipeline,
    running: Arc<AtomicBool>,
}

impl VideoStreamer {
    /// Wrap `source` and a **started** pipeline.
    ///
    /// The source's dimensions must agree with the pipeline
    /// configuration.
    pub fn new(source: Box<dyn FrameSource>, pipeline: H264Pipeline) -> Result<Self, ClientError> {
        let config = pipeline.config();
        if source.width() != config.width || source.height() != config.height {
            return Err(ClientError::Configuration(format!(
                "source is {}x{}, pipeline configured for {}x{}",
                source.width(),
                source.height(),
                config.width,
                config.height
            )));
        }
        Ok(Self {
            source,
            pipeline,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// A cloneable handle that can be used to stop the streamer from
    /// another task. May be flipped before or during [`run`](Self::run).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the streamer to stop after the current frame.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the capture loop is still willing to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the capture loop until end-of-stream, stop, or a fault.
    ///
    /// The pipeline is stopped (and its buffered chunks flushed) on
    /// every exit path.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        if self.pipeline.state() != PipelineState::Streaming {
            return Err(ClientError::PipelineStopped);
        }

        let interval = Duration::from_secs_f64(1.0 / self.source.fps().max(1.0));
        let mut pushed: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(pushed, "capture source reached end of stream");
                    break;
                }
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    self.pipeline.stop().await;
                    return Err(e);
                }
            };

            if let Err(e) = self.pipeline.push_frame(frame).await {
                self.running.store(false, Ordering::SeqCst);
                self.pipeline.stop().await;
                return Err(e);
            }
            pushed += 1;

            Self::pace(loop_start, interval).await;
        }

        self.running.store(false, Ordering::SeqCst);
        self.pipeline.stop().await;
        Ok(())
    }

    /// Sleep for the remainder of the frame interval.
    async fn pace(loop_start: Instant, interval: Duration) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::capture::TestPatternSource;
    use crate::video::encode::testing::DelayLineEncoder;
    use crate::video::pipeline::VideoConfig;

    fn small_config() -> VideoConfig {
        VideoConfig {
            width: 8,
            height: 8,
            fps: 240.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn streams_source_to_completion() {
        let source = TestPatternSource::new(8, 8, 240.0).unwrap().with_limit(5);
        let mut pipeline =
            H264Pipeline::new(small_config(), Box::new(DelayLineEncoder::new(2))).unwrap();
        let mut chunks = pipeline.start().unwrap();

        let mut streamer = VideoStreamer::new(Box::new(source), pipeline).unwrap();
        streamer.run().await.unwrap();

        let mut timestamps = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            timestamps.push(chunk.timestamp_ns);
        }
        assert_eq!(timestamps.len(), 5);
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn stop_handle_halts_an_endless_source() {
        let source = TestPatternSource::new(8, 8, 240.0).unwrap();
        let mut pipeline =
            H264Pipeline::new(small_config(), Box::new(DelayLineEncoder::new(0))).unwrap();
        let mut chunks = pipeline.start().unwrap();

        let mut streamer = VideoStreamer::new(Box::new(source), pipeline).unwrap();
        let stop = streamer.stop_handle();

        let task = tokio::spawn(async move { streamer.run().await });

        // Let a few frames through, then pull the plug.
        let mut received = 0;
        while received < 3 {
            if chunks.recv().await.is_some() {
                received += 1;
            } else {
                break;
            }
        }
        stop.store(false, Ordering::SeqCst);

        // Keep draining so a full chunk queue cannot wedge the worker,
        // then reap the streamer task.
        while chunks.recv().await.is_some() {}
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_configuration_error() {
        let source = TestPatternSource::new(16, 16, 30.0).unwrap();
        let pipeline =
            H264Pipeline::new(small_config(), Box::new(DelayLineEncoder::new(0))).unwrap();
        let result = VideoStreamer::new(Box::new(source), pipeline);
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn run_requires_a_started_pipeline() {
        let source = TestPatternSource::new(8, 8, 30.0).unwrap();
        let pipeline =
            H264Pipeline::new(small_config(), Box::new(DelayLineEncoder::new(0))).unwrap();
        let mut streamer = VideoStreamer::new(Box::new(source), pipeline).unwrap();
        assert!(matches!(
            streamer.run().await,
            Err(ClientError::PipelineStopped)
        ));
    }
}
