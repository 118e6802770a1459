use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-thread pipeline monitoring
#[derive(Clone)]
pub struct PipelineMetrics {
    // Audio level monitoring (over emitted PCM16 samples)
    pub current_peak: Arc<AtomicI16>, // Peak sample value in current window
    pub current_rms: Arc<AtomicU64>,  // RMS * 1000 for precision
    pub audio_level_db: Arc<AtomicI16>, // Current level in dB * 10

    // Pipeline stage tracking
    pub stage_source: Arc<AtomicBool>, // Raw blocks reached the stage
    pub stage_downsampler: Arc<AtomicBool>, // Downsampler produced a frame
    pub stage_output: Arc<AtomicBool>, // Frame reached a consumer

    // Frame rate tracking
    pub source_fps: Arc<AtomicU64>, // Blocks per second * 10
    pub frame_fps: Arc<AtomicU64>,  // Encoded frames per second * 10

    // Event counters
    pub source_blocks: Arc<AtomicU64>,
    pub encoded_frames: Arc<AtomicU64>,
    pub downsampler_errors: Arc<AtomicU64>,

    // Activity indicators
    pub last_frame_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            current_peak: Arc::new(AtomicI16::new(0)),
            current_rms: Arc::new(AtomicU64::new(0)),
            audio_level_db: Arc::new(AtomicI16::new(-900)),

            stage_source: Arc::new(AtomicBool::new(false)),
            stage_downsampler: Arc::new(AtomicBool::new(false)),
            stage_output: Arc::new(AtomicBool::new(false)),

            source_fps: Arc::new(AtomicU64::new(0)),
            frame_fps: Arc::new(AtomicU64::new(0)),

            source_blocks: Arc::new(AtomicU64::new(0)),
            encoded_frames: Arc::new(AtomicU64::new(0)),
            downsampler_errors: Arc::new(AtomicU64::new(0)),

            last_frame_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn update_audio_level(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let peak = samples.iter().map(|&s| s.saturating_abs()).max().unwrap_or(0);
        self.current_peak.store(peak, Ordering::Relaxed);

        let sum: i64 = samples.iter().map(|&s| s as i64 * s as i64).sum();
        let rms = ((sum as f64 / samples.len() as f64).sqrt() * 1000.0) as u64;
        self.current_rms.store(rms, Ordering::Relaxed);

        let db = if peak > 0 {
            (20.0 * (peak as f64 / 32768.0).log10() * 10.0) as i16
        } else {
            -900
        };
        self.audio_level_db.store(db, Ordering::Relaxed);
    }

    pub fn mark_stage_active(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Source => self.stage_source.store(true, Ordering::Relaxed),
            PipelineStage::Downsampler => self.stage_downsampler.store(true, Ordering::Relaxed),
            PipelineStage::Output => self.stage_output.store(true, Ordering::Relaxed),
        }
    }

    pub fn decay_stages(&self) {
        self.stage_source.store(false, Ordering::Relaxed);
        self.stage_downsampler.store(false, Ordering::Relaxed);
        self.stage_output.store(false, Ordering::Relaxed);
    }

    pub fn update_source_fps(&self, fps: f64) {
        self.source_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn update_frame_fps(&self, fps: f64) {
        self.frame_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn increment_source_blocks(&self) {
        self.source_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_encoded_frames(&self) {
        self.encoded_frames.fetch_add(1, Ordering::Relaxed);
        *self.last_frame_time.write() = Some(Instant::now());
    }

    pub fn increment_downsampler_errors(&self) {
        self.downsampler_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PipelineStage {
    Source,
    Downsampler,
    Output,
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}
