pub mod block;
pub mod codebook;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod motion;
pub mod pixel;
pub mod stats;

pub use block::{BlockView, PixelPlane, PixelPlaneMut};
pub use codebook::{validate_geometry, Codebook};
pub use codec::BlockCodec;
pub use config::EncoderConfig;
pub use decoder::{FrameDecoder, VideoDecoder};
pub use encoder::{EncodedFrame, FrameEncoder, VideoEncoder};
pub use format::{BlockDim, BlockRef, FrameHeader, RefSource, HEADER_SIZE};
pub use pixel::{ChannelOrder, Rgb};
pub use stats::Statistics;
