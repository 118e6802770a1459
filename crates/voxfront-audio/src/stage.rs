use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::downsampler::StreamingDownsampler;
use super::frame::Pcm16Message;
use voxfront_foundation::AudioError;
use voxfront_telemetry::{FpsTracker, PipelineMetrics, PipelineStage};

/// One block of raw audio as delivered by the capture callback.
/// Channel 0 is the one that reaches the downsampler.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageConfig {
    pub target_rate_hz: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            target_rate_hz: StreamingDownsampler::DEFAULT_TARGET_RATE,
        }
    }
}

/// Async stage that owns one [`StreamingDownsampler`]: raw blocks in,
/// encoded PCM16 messages out. The worker task is the sole owner of the
/// downsampler, so the core needs no locking.
pub struct DownsamplerStage {
    input_rx: mpsc::Receiver<RawBlock>,
    output_tx: broadcast::Sender<Pcm16Message>,
    cfg: StageConfig,
    running: Arc<AtomicBool>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl DownsamplerStage {
    pub fn new(
        input_rx: mpsc::Receiver<RawBlock>,
        output_tx: broadcast::Sender<Pcm16Message>,
        cfg: StageConfig,
    ) -> Self {
        Self {
            input_rx,
            output_tx,
            cfg,
            running: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, AudioError> {
        let mut worker = StageWorker::new(
            self.input_rx,
            self.output_tx,
            StreamingDownsampler::new(self.cfg.target_rate_hz)?,
            self.metrics,
        );
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        Ok(tokio::spawn(async move {
            worker.run(running).await;
        }))
    }
}

struct StageWorker {
    input_rx: mpsc::Receiver<RawBlock>,
    output_tx: broadcast::Sender<Pcm16Message>,
    downsampler: StreamingDownsampler,
    current_input_rate: Option<u32>,
    metrics: Option<Arc<PipelineMetrics>>,
    source_fps_tracker: FpsTracker,
    frame_fps_tracker: FpsTracker,
    frames_emitted: u64,
}

impl StageWorker {
    fn new(
        input_rx: mpsc::Receiver<RawBlock>,
        output_tx: broadcast::Sender<Pcm16Message>,
        downsampler: StreamingDownsampler,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Self {
        Self {
            input_rx,
            output_tx,
            downsampler,
            current_input_rate: None,
            metrics,
            source_fps_tracker: FpsTracker::new(),
            frame_fps_tracker: FpsTracker::new(),
            frames_emitted: 0,
        }
    }

    async fn run(&mut self, running: Arc<AtomicBool>) {
        tracing::info!(
            target_rate_hz = self.downsampler.target_rate(),
            "Downsampler stage started"
        );

        while running.load(Ordering::SeqCst) {
            match self.input_rx.recv().await {
                Some(block) => self.handle_block(block),
                // Source closed, nothing more will arrive
                None => break,
            }
        }

        tracing::info!(
            frames_emitted = self.frames_emitted,
            "Downsampler stage stopped"
        );
    }

    fn handle_block(&mut self, block: RawBlock) {
        if let Some(m) = &self.metrics {
            m.increment_source_blocks();
            if let Some(fps) = self.source_fps_tracker.tick() {
                m.update_source_fps(fps);
            }
            m.mark_stage_active(PipelineStage::Source);
        }

        // A device rate change starts a fresh session; the remainder
        // carried under the old rate is discarded.
        if let Some(rate) = self.current_input_rate {
            if rate != block.sample_rate {
                tracing::info!(
                    "Input rate changed: {}Hz -> {}Hz, resetting downsampler",
                    rate,
                    block.sample_rate
                );
                self.downsampler.reset();
            }
        }
        self.current_input_rate = Some(block.sample_rate);

        match self
            .downsampler
            .process_block(&block.channels, block.sample_rate)
        {
            Ok(Some(frame)) => {
                if let Some(m) = &self.metrics {
                    m.update_audio_level(&frame.samples);
                    m.increment_encoded_frames();
                    if let Some(fps) = self.frame_fps_tracker.tick() {
                        m.update_frame_fps(fps);
                    }
                    m.mark_stage_active(PipelineStage::Downsampler);
                }
                self.frames_emitted += 1;

                // A send on a broadcast channel fails only when there are
                // no receivers; that is not fatal for the stage.
                match self.output_tx.send(frame.into_message()) {
                    Ok(num_receivers) => {
                        tracing::trace!("Stage: frame sent to {} receivers", num_receivers);
                        if let Some(m) = &self.metrics {
                            m.mark_stage_active(PipelineStage::Output);
                        }
                    }
                    Err(_) => {
                        tracing::warn!("No active listeners for PCM frames.");
                    }
                }
            }
            Ok(None) => {
                tracing::trace!(
                    pending = self.downsampler.pending_samples(),
                    "Block buffered, no window completed"
                );
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.increment_downsampler_errors();
                }
                tracing::warn!("Dropping block: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &[f32], rate: u32) -> RawBlock {
        RawBlock {
            channels: vec![samples.to_vec()],
            sample_rate: rate,
            timestamp: Instant::now(),
        }
    }

    #[tokio::test]
    async fn blocks_flow_to_broadcast() {
        let (tx, rx) = mpsc::channel::<RawBlock>(16);
        let (out_tx, mut out_rx) = broadcast::channel::<Pcm16Message>(8);
        let stage = DownsamplerStage::new(rx, out_tx, StageConfig::default());
        let handle = stage.spawn().unwrap();

        tx.send(block(
            &[1.0, 1.0, 1.0, -1.0, -1.0, -1.0, 0.0, 0.0, 0.0],
            48_000,
        ))
        .await
        .unwrap();

        let msg = out_rx.recv().await.unwrap();
        assert_eq!(msg.sample_rate, 16_000);
        assert_eq!(msg.message_type(), "pcm16");
        assert_eq!(
            msg.buffer,
            vec![0xFF, 0x7F, 0x00, 0x80, 0x00, 0x00] // 32767, -32768, 0
        );

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sub_window_input_emits_nothing() {
        let (tx, rx) = mpsc::channel::<RawBlock>(16);
        let (out_tx, mut out_rx) = broadcast::channel::<Pcm16Message>(8);
        let handle = DownsamplerStage::new(rx, out_tx, StageConfig::default())
            .spawn()
            .unwrap();

        // Two samples at ratio 3 never complete a window
        tx.send(block(&[0.5, 0.5], 48_000)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(matches!(
            out_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn rate_change_resets_instead_of_erroring() {
        let metrics = Arc::new(PipelineMetrics::default());
        let (tx, rx) = mpsc::channel::<RawBlock>(16);
        let (out_tx, mut out_rx) = broadcast::channel::<Pcm16Message>(8);
        let handle = DownsamplerStage::new(rx, out_tx, StageConfig::default())
            .with_metrics(metrics.clone())
            .spawn()
            .unwrap();

        // Carries two samples at 48kHz, then the device switches to 16kHz
        tx.send(block(&[0.9, 0.9], 48_000)).await.unwrap();
        tx.send(block(&[0.25, 0.25, 0.25, 0.25], 16_000)).await.unwrap();

        let msg = out_rx.recv().await.unwrap();
        // The 48kHz carry was discarded by the reset: four width-one
        // windows of 0.25, not an average polluted by the 0.9s.
        let expected = ((0.25f64 * 32767.0) as i16).to_le_bytes();
        assert_eq!(msg.len(), 4);
        assert_eq!(&msg.buffer[..2], &expected);

        drop(tx);
        handle.await.unwrap();

        assert_eq!(metrics.downsampler_errors.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.encoded_frames.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.source_blocks.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn contract_violations_are_counted_and_skipped() {
        let metrics = Arc::new(PipelineMetrics::default());
        let (tx, rx) = mpsc::channel::<RawBlock>(16);
        let (out_tx, _out_rx) = broadcast::channel::<Pcm16Message>(8);
        let handle = DownsamplerStage::new(rx, out_tx, StageConfig::default())
            .with_metrics(metrics.clone())
            .spawn()
            .unwrap();

        // Upsampling request violates the contract; the stage keeps going
        tx.send(block(&[0.1], 8_000)).await.unwrap();
        tx.send(block(&[0.5, 0.5, 0.5], 48_000)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(metrics.downsampler_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.encoded_frames.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn zero_target_rate_fails_at_spawn() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let (_tx, rx) = mpsc::channel::<RawBlock>(1);
        let (out_tx, _out_rx) = broadcast::channel::<Pcm16Message>(1);
        let stage = DownsamplerStage::new(rx, out_tx, StageConfig { target_rate_hz: 0 });
        assert!(matches!(
            stage.spawn(),
            Err(AudioError::InvalidTargetRate { rate: 0 })
        ));
    }
}
