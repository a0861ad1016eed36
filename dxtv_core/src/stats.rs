use serde::{Deserialize, Serialize};

use crate::format::{BlockDim, RefSource, BLOCK_LEVELS, MACROBLOCK_DIM, MIN_BLOCK_DIM};

/// Observational counters filled in by the encoder.
///
/// Block counters are indexed by [`BlockDim::level`]: 0 for 8×8, 1 for 4×4.
/// The encoder only ever writes to this; nothing it decides depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub frames: u32,
    pub key_frames: u32,
    pub repeated_frames: u32,
    pub references_current: [u32; BLOCK_LEVELS],
    pub references_previous: [u32; BLOCK_LEVELS],
    pub codec_blocks: [u32; BLOCK_LEVELS],
    /// Compressed bytes produced, headers included.
    pub bytes: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reference(&mut self, dim: BlockDim, source: RefSource) {
        match source {
            RefSource::Current => self.references_current[dim.level()] += 1,
            RefSource::Previous => self.references_previous[dim.level()] += 1,
        }
    }

    pub fn record_codec_block(&mut self, dim: BlockDim) {
        self.codec_blocks[dim.level()] += 1;
    }

    /// Add all of `other`'s counters to this one.
    pub fn merge(&mut self, other: &Statistics) {
        self.frames += other.frames;
        self.key_frames += other.key_frames;
        self.repeated_frames += other.repeated_frames;
        for level in 0..BLOCK_LEVELS {
            self.references_current[level] += other.references_current[level];
            self.references_previous[level] += other.references_previous[level];
            self.codec_blocks[level] += other.codec_blocks[level];
        }
        self.bytes += other.bytes;
    }

    /// Area covered by `counts`, in 4×4 block units.
    fn area(counts: &[u32; BLOCK_LEVELS]) -> u64 {
        let per_macroblock = (MACROBLOCK_DIM / MIN_BLOCK_DIM).pow(2) as u64;
        counts[0] as u64 * per_macroblock + counts[1] as u64
    }

    /// Share of the coded area (in percent) covered by current-frame references,
    /// previous-frame references and codec blocks.
    pub fn area_percentages(&self) -> (f64, f64, f64) {
        let current = Self::area(&self.references_current);
        let previous = Self::area(&self.references_previous);
        let codec = Self::area(&self.codec_blocks);
        let total = current + previous + codec;
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let pct = |n: u64| n as f64 * 100.0 / total as f64;
        (pct(current), pct(previous), pct(codec))
    }
}
