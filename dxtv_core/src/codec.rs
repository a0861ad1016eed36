use crate::format::BlockDim;
use crate::pixel::{ChannelOrder, Rgb};

/// Fixed-ratio single-block color codec.
///
/// The frame encoder falls back to a `BlockCodec` whenever no motion reference
/// is good enough. Each implementation:
/// - Is identified by a stable numeric `id()` stored in every frame header.
/// - Produces exactly `encoded_size(dim)` bytes per block, for both supported
///   dimensions.
/// - Must leave bit 15 of the first little-endian u16 of its output clear.
///   That bit tells a block codec record apart from a reference record.
/// - Must be deterministic: the encoder keeps `decode_block(encode_block(..))`
///   as its reconstruction, and the decoder has to arrive at the same pixels.
pub trait BlockCodec: Send + Sync {
    /// Stable codec ID stored in the frame header.
    fn id(&self) -> u16;

    /// Human-readable codec name for diagnostics.
    fn name(&self) -> &'static str;

    /// Bytes one encoded block of dimension `dim` occupies.
    fn encoded_size(&self, dim: BlockDim) -> usize;

    /// Encode `dim × dim` row-major pixels.
    fn encode_block(
        &self,
        pixels: &[Rgb],
        dim: BlockDim,
        order: ChannelOrder,
    ) -> anyhow::Result<Vec<u8>>;

    /// Decode exactly `encoded_size(dim)` bytes into `dim × dim` row-major pixels.
    fn decode_block(
        &self,
        data: &[u8],
        dim: BlockDim,
        order: ChannelOrder,
    ) -> anyhow::Result<Vec<Rgb>>;
}
