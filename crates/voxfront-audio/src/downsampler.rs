use voxfront_foundation::AudioError;

use super::frame::Pcm16Frame;

/// Streaming box-filter decimator for mono f32 audio.
///
/// - Accepts arbitrary-sized input blocks from a real-time callback
/// - Averages `input_rate / target_rate` input samples per output sample
/// - Carries unconsumed tail samples across calls so that every input
///   sample lands in exactly one output window
/// - Quantizes completed windows to 16-bit signed PCM
///
/// Output windows live on a single grid for the whole session: window
/// `n` covers input indices `[floor(n*ratio), floor((n+1)*ratio))`
/// counted from the first sample ever received, regardless of how the
/// input was blocked. A window is emitted once its last sample has
/// arrived, so the output count never drifts from `total / ratio` by
/// more than one sample no matter how irregular the blocks are.
#[derive(Debug)]
pub struct StreamingDownsampler {
    target_rate: u32,
    /// Input samples received but not yet consumed by a completed window
    remainder: Vec<f32>,
    /// Input rate that opened the current session; calls at any other
    /// rate are rejected until `reset`
    session_rate: Option<u32>,
    /// Windows emitted since the session started
    windows_emitted: u64,
    /// Global index of the first carried sample, always
    /// `floor(windows_emitted * ratio)`
    consumed: u64,
}

impl StreamingDownsampler {
    pub const DEFAULT_TARGET_RATE: u32 = 16_000;

    /// Create a downsampler targeting `target_rate` Hz.
    pub fn new(target_rate: u32) -> Result<Self, AudioError> {
        if target_rate == 0 {
            return Err(AudioError::InvalidTargetRate { rate: target_rate });
        }
        Ok(Self {
            target_rate,
            remainder: Vec::new(),
            session_rate: None,
            windows_emitted: 0,
            consumed: 0,
        })
    }

    /// Consume one block of per-channel samples at `input_rate` Hz.
    ///
    /// Only channel 0 is used; additional channels are ignored. Returns
    /// `Ok(None)` when the block (plus any carried remainder) does not
    /// complete a single output window, or when the block is empty.
    ///
    /// The input rate must stay constant for the lifetime of a session;
    /// a deliberate device change goes through [`reset`](Self::reset).
    pub fn process_block<S: AsRef<[f32]>>(
        &mut self,
        channels: &[S],
        input_rate: u32,
    ) -> Result<Option<Pcm16Frame>, AudioError> {
        if input_rate == 0 {
            return Err(AudioError::InvalidInputRate { rate: input_rate });
        }
        if input_rate < self.target_rate {
            return Err(AudioError::UnsupportedRatio {
                input_rate,
                target_rate: self.target_rate,
            });
        }
        if let Some(previous) = self.session_rate {
            if previous != input_rate {
                return Err(AudioError::InputRateChanged {
                    previous,
                    current: input_rate,
                });
            }
        }

        // "No samples this cycle" is a legitimate no-op, not an error.
        let samples = match channels.first() {
            Some(ch) if !ch.as_ref().is_empty() => ch.as_ref(),
            _ => return Ok(None),
        };
        self.session_rate = Some(input_rate);

        // Remainder samples are older and must precede the new block.
        let mut merged = std::mem::take(&mut self.remainder);
        merged.extend_from_slice(samples);

        // merged[j] sits at global input index base + j.
        let base = self.consumed;
        let total = base + merged.len() as u64;

        // Exact window boundary: floor(n * input_rate / target_rate).
        let in_rate = input_rate as u128;
        let out_rate = self.target_rate as u128;
        let boundary = move |n: u64| -> u64 { ((n as u128 * in_rate) / out_rate) as u64 };

        let mut averaged = Vec::new();
        while boundary(self.windows_emitted + 1) <= total {
            let n = self.windows_emitted;
            let start = (boundary(n) - base) as usize;
            let end = ((boundary(n + 1) - base) as usize).min(merged.len());
            let window = &merged[start.min(end)..end];
            // Empty window is unreachable for ratio >= 1, guarded anyway.
            let mean = if window.is_empty() {
                0.0
            } else {
                window.iter().map(|&s| s as f64).sum::<f64>() / window.len() as f64
            };
            averaged.push(mean);
            self.windows_emitted += 1;
        }

        // Tail not consumed by any completed window, carried verbatim.
        self.consumed = boundary(self.windows_emitted);
        let keep_from = ((self.consumed - base) as usize).min(merged.len());
        self.remainder = merged.split_off(keep_from);

        if averaged.is_empty() {
            return Ok(None);
        }

        let samples: Vec<i16> = averaged.into_iter().map(quantize_i16).collect();
        Ok(Some(Pcm16Frame {
            sample_rate: self.target_rate,
            samples,
        }))
    }

    /// Discard carried state and start a new session. The remainder is
    /// dropped: its fractional-time position under the old rate has no
    /// meaning under a new one.
    pub fn reset(&mut self) {
        self.remainder.clear();
        self.session_rate = None;
        self.windows_emitted = 0;
        self.consumed = 0;
    }

    /// Target output rate in Hz.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Number of carried samples not yet consumed by a completed window.
    pub fn pending_samples(&self) -> usize {
        self.remainder.len()
    }

    /// Total input samples consumed into completed windows this session.
    pub fn consumed_samples(&self) -> u64 {
        self.consumed
    }
}

impl Default for StreamingDownsampler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TARGET_RATE).expect("default target rate is non-zero")
    }
}

/// Clamp to [-1.0, 1.0] and map onto the asymmetric i16 range:
/// negative values scale by 32768, non-negative by 32767, truncating
/// toward zero.
fn quantize_i16(sample: f64) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}
