pub mod downsampler;
pub mod frame;
pub mod stage;

// Public API
pub use downsampler::StreamingDownsampler;
pub use frame::{Pcm16Frame, Pcm16Message, PCM16_MESSAGE_TYPE};
pub use stage::{DownsamplerStage, RawBlock, StageConfig};
