use std::time::Duration;

/// Type tag carried by every encoded message on the output boundary.
pub const PCM16_MESSAGE_TYPE: &str = "pcm16";

/// One completed batch of downsampled 16-bit PCM samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm16Frame {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl Pcm16Frame {
    /// Audio duration covered by this frame.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Encode into the wire form, consuming the frame. The downstream
    /// consumer becomes the sole owner of the byte buffer.
    pub fn into_message(self) -> Pcm16Message {
        let mut buffer = Vec::with_capacity(self.samples.len() * 2);
        for sample in self.samples {
            buffer.extend_from_slice(&sample.to_le_bytes());
        }
        Pcm16Message {
            sample_rate: self.sample_rate,
            buffer,
        }
    }
}

/// Wire form of a frame: raw little-endian i16 bytes plus the rate,
/// tagged [`PCM16_MESSAGE_TYPE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm16Message {
    pub sample_rate: u32,
    pub buffer: Vec<u8>,
}

impl Pcm16Message {
    pub fn message_type(&self) -> &'static str {
        PCM16_MESSAGE_TYPE
    }

    /// Number of samples encoded in the buffer.
    pub fn len(&self) -> usize {
        self.buffer.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
