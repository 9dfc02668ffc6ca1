pub mod error;
pub mod frame;
pub mod sampler;
pub mod source;

pub use error::VideoError;
pub use frame::{Frame, RawFrame};
pub use sampler::{sample_indices, FrameSample, FrameSampler, SamplerConfig};
pub use source::{
    ClipOpener, FrameSource, FrameStream, ImageSequence, ImageSequenceOpener, MemoryClip,
    SequentialReader, VideoAsset,
};
