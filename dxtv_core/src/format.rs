//! DXTV bitstream layout, constants and the small bit-packing helpers.
//!
//! ```text
//! [HEADER: 8 bytes]                      flags:u16 | codec_id:u16 | uncompressed_size:u32
//! for each macroblock row:
//!   for each run of up to 16 macroblocks:
//!     [FLAGS: u16]                       bit i = macroblock i of the run is split
//!     [PAYLOAD macroblock 0] ... [PAYLOAD macroblock n-1]
//! ```
//!
//! A macroblock payload is either one 8×8 block or, if split, four 4×4 blocks
//! in the order top-left, top-right, bottom-left, bottom-right. Every block is
//! one of:
//!
//! - a 2-byte reference record (bit 15 set), or
//! - a block codec record of fixed size for its dimension (bit 15 of its
//!   first little-endian u16 clear).
//!
//! All multi-byte values are little-endian.

use crate::pixel::{ChannelOrder, BYTES_PER_PIXEL};

// ── Geometry ───────────────────────────────────────────────────────────────

/// Edge length of a macroblock, the unit frames are partitioned into.
pub const MACROBLOCK_DIM: usize = 8;

/// Edge length of the smallest block a macroblock can be split into.
pub const MIN_BLOCK_DIM: usize = 4;

/// Split flags carried by one flag word.
pub const FLAGS_PER_WORD: usize = 16;

/// Size of a reference record in bytes.
pub const REFERENCE_SIZE: usize = 2;

/// Supported block edge lengths. Recursion goes `Eight` → `Four` and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockDim {
    Eight,
    Four,
}

impl BlockDim {
    pub const ALL: [BlockDim; 2] = [BlockDim::Eight, BlockDim::Four];

    /// Edge length in pixels.
    #[inline]
    pub const fn pixels(self) -> usize {
        match self {
            BlockDim::Eight => MACROBLOCK_DIM,
            BlockDim::Four => MIN_BLOCK_DIM,
        }
    }

    /// Number of pixels in a block of this dimension.
    #[inline]
    pub const fn area(self) -> usize {
        self.pixels() * self.pixels()
    }

    /// The dimension of this block's quadrants, or `None` at the minimum size.
    #[inline]
    pub const fn half(self) -> Option<BlockDim> {
        match self {
            BlockDim::Eight => Some(BlockDim::Four),
            BlockDim::Four => None,
        }
    }

    /// Split depth: 0 for macroblocks, 1 for their quadrants.
    #[inline]
    pub const fn level(self) -> usize {
        match self {
            BlockDim::Eight => 0,
            BlockDim::Four => 1,
        }
    }

}

/// Number of block levels (8×8 and 4×4).
pub const BLOCK_LEVELS: usize = BlockDim::ALL.len();

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_DXT: u16 = 1;

// ── Frame header ───────────────────────────────────────────────────────────

/// Fixed size of the frame header in bytes. Must stay a multiple of 4.
pub const HEADER_SIZE: usize = 8;

/// Frame predicts from the previous frame.
pub const FRAME_IS_PFRAME: u16 = 0x0080;

/// Frame is a copy of the previous frame; nothing follows the header.
pub const FRAME_REPEATED: u16 = 0x0040;

/// Block codec endpoints are stored with red and blue swapped.
pub const FRAME_SWAP_CHANNELS: u16 = 0x0020;

const KNOWN_FRAME_FLAGS: u16 = FRAME_IS_PFRAME | FRAME_REPEATED | FRAME_SWAP_CHANNELS;

const _: () = assert!(HEADER_SIZE % 4 == 0);

/// Decoded representation of the 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u16,
    /// `BlockCodec::id()` of the codec that produced the block records.
    pub codec_id: u16,
    /// Size of the decoded frame in bytes (`width * height * 3`).
    pub uncompressed_size: u32,
}

impl FrameHeader {
    pub fn new(flags: u16, codec_id: u16, width: usize, height: usize) -> anyhow::Result<Self> {
        let Some(uncompressed_size) = uncompressed_size(width, height) else {
            anyhow::bail!("frame size {}x{} does not fit the header", width, height);
        };
        Ok(Self {
            flags,
            codec_id,
            uncompressed_size,
        })
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.flags.to_le_bytes());
        buf[2..4].copy_from_slice(&self.codec_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf
    }

    /// Deserialize from the start of `buf`, rejecting short input and unknown flags.
    pub fn from_bytes(buf: &[u8]) -> anyhow::Result<Self> {
        if buf.len() < HEADER_SIZE {
            anyhow::bail!(
                "truncated frame: {} bytes, header alone needs {}",
                buf.len(),
                HEADER_SIZE
            );
        }
        let header = Self {
            flags: u16::from_le_bytes(buf[0..2].try_into()?),
            codec_id: u16::from_le_bytes(buf[2..4].try_into()?),
            uncompressed_size: u32::from_le_bytes(buf[4..8].try_into()?),
        };
        if header.flags & !KNOWN_FRAME_FLAGS != 0 {
            anyhow::bail!("unknown frame flags {:#06x}", header.flags);
        }
        Ok(header)
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn is_repeated(&self) -> bool {
        self.has_flag(FRAME_REPEATED)
    }

    pub fn is_predicted(&self) -> bool {
        self.has_flag(FRAME_IS_PFRAME)
    }

    pub fn channel_order(&self) -> ChannelOrder {
        if self.has_flag(FRAME_SWAP_CHANNELS) {
            ChannelOrder::Bgr
        } else {
            ChannelOrder::Rgb
        }
    }
}

/// Decoded frame size in bytes, or `None` if it overflows the header's u32.
pub fn uncompressed_size(width: usize, height: usize) -> Option<u32> {
    let bytes = width.checked_mul(height)?.checked_mul(BYTES_PER_PIXEL)?;
    u32::try_from(bytes).ok()
}

// ── Reference records ──────────────────────────────────────────────────────

/// Set in the leading u16 of every reference record.
pub const BLOCK_IS_REF: u16 = 1 << 15;

/// Reference reads from the previous frame (clear: current frame).
pub const BLOCK_FROM_PREV: u16 = 1 << 14;

/// Bits per displacement component. dy occupies bits 13..7, dx bits 6..0.
pub const MOTION_BITS: u32 = 7;
pub const MOTION_MASK: u16 = (1 << MOTION_BITS) - 1;
pub const MOTION_Y_SHIFT: u32 = MOTION_BITS;

/// Added to signed displacements so they fit the unsigned fields.
pub const MOTION_BIAS: i32 = (1 << MOTION_BITS) / 2 - 1;
pub const MOTION_MIN: i32 = -MOTION_BIAS;
pub const MOTION_MAX: i32 = MOTION_MASK as i32 - MOTION_BIAS;

const _: () = assert!(2 + 2 * MOTION_BITS <= 16);

// ── Motion search windows ──────────────────────────────────────────────────

/// Inclusive (min, max) horizontal displacement searched in the previous frame.
pub const PREV_SEARCH_X: (i32, i32) = (-16, 16);
/// Inclusive (min, max) vertical displacement searched in the previous frame.
pub const PREV_SEARCH_Y: (i32, i32) = (-16, 16);
/// Inclusive (min, max) horizontal displacement searched in the current frame.
pub const CURR_SEARCH_X: (i32, i32) = (-16, 16);
/// Inclusive (min, max) vertical displacement searched in the current frame.
/// Never downwards: rows below are not decoded yet. The search also stays
/// inside the block's macroblock row, so a 4×4 block reaches at most dy = -4.
pub const CURR_SEARCH_Y: (i32, i32) = (-16, 0);

const _: () = assert!(PREV_SEARCH_X.0 >= MOTION_MIN && PREV_SEARCH_X.1 <= MOTION_MAX);
const _: () = assert!(PREV_SEARCH_Y.0 >= MOTION_MIN && PREV_SEARCH_Y.1 <= MOTION_MAX);
const _: () = assert!(CURR_SEARCH_X.0 >= MOTION_MIN && CURR_SEARCH_X.1 <= MOTION_MAX);
const _: () = assert!(CURR_SEARCH_Y.0 >= MOTION_MIN && CURR_SEARCH_Y.1 <= 0);

/// Whole-frame error below which a frame is sent as "repeated".
pub const REPEAT_EPSILON: f64 = 1e-5;

/// Which frame a reference record copies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefSource {
    Current,
    Previous,
}

/// A motion-compensated block: copy `dim × dim` pixels from
/// `(x + dx, y + dy)` of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub source: RefSource,
    pub dx: i32,
    pub dy: i32,
}

impl BlockRef {
    /// Pack into the 16-bit record.
    pub fn to_word(&self) -> anyhow::Result<u16> {
        if !(MOTION_MIN..=MOTION_MAX).contains(&self.dx)
            || !(MOTION_MIN..=MOTION_MAX).contains(&self.dy)
        {
            anyhow::bail!(
                "motion offset ({}, {}) outside representable range [{}, {}]",
                self.dx,
                self.dy,
                MOTION_MIN,
                MOTION_MAX
            );
        }
        let mut word = BLOCK_IS_REF;
        if self.source == RefSource::Previous {
            word |= BLOCK_FROM_PREV;
        }
        word |= (((self.dy + MOTION_BIAS) as u16) & MOTION_MASK) << MOTION_Y_SHIFT;
        word |= ((self.dx + MOTION_BIAS) as u16) & MOTION_MASK;
        Ok(word)
    }

    pub fn to_bytes(&self) -> anyhow::Result<[u8; REFERENCE_SIZE]> {
        Ok(self.to_word()?.to_le_bytes())
    }

    /// Unpack a record word; `None` if the reference bit is clear.
    pub fn from_word(word: u16) -> Option<Self> {
        if word & BLOCK_IS_REF == 0 {
            return None;
        }
        let source = if word & BLOCK_FROM_PREV != 0 {
            RefSource::Previous
        } else {
            RefSource::Current
        };
        Some(Self {
            source,
            dx: (word & MOTION_MASK) as i32 - MOTION_BIAS,
            dy: ((word >> MOTION_Y_SHIFT) & MOTION_MASK) as i32 - MOTION_BIAS,
        })
    }
}

// ── Split flag words ───────────────────────────────────────────────────────

/// Packs split flags into 16-bit words.
///
/// Bit order: the first flag pushed lands in bit 0, the next in bit 1, and so
/// on. A word is handed out as soon as 16 flags are in it. [`flush`] hands out
/// a partial word, whose flags therefore sit right-aligned in the low bits.
///
/// [`flush`]: FlagWriter::flush
#[derive(Debug, Default)]
pub struct FlagWriter {
    word: u16,
    len: usize,
}

impl FlagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one flag. Returns the completed word after the 16th flag.
    pub fn push(&mut self, flag: bool) -> Option<u16> {
        if flag {
            self.word |= 1 << self.len;
        }
        self.len += 1;
        if self.len == FLAGS_PER_WORD {
            return self.flush();
        }
        None
    }

    /// Hand out the pending flags, if any, and start a new word.
    pub fn flush(&mut self) -> Option<u16> {
        if self.len == 0 {
            return None;
        }
        let word = self.word;
        self.word = 0;
        self.len = 0;
        Some(word)
    }

    /// Flags pushed since the last completed word.
    pub fn pending(&self) -> usize {
        self.len
    }
}

/// Reads split flags back out of one word, in the order [`FlagWriter`] wrote them.
#[derive(Debug, Clone)]
pub struct FlagReader {
    word: u16,
    remaining: usize,
}

impl FlagReader {
    /// `count` is the number of macroblocks the word covers (1..=16).
    pub fn new(word: u16, count: usize) -> Self {
        Self {
            word,
            remaining: count.min(FLAGS_PER_WORD),
        }
    }

    /// True if any bit above the covered macroblocks is set.
    pub fn has_stray_bits(&self) -> bool {
        self.remaining < FLAGS_PER_WORD && (self.word >> self.remaining) != 0
    }
}

impl Iterator for FlagReader {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.remaining == 0 {
            return None;
        }
        let flag = self.word & 1 != 0;
        self.word >>= 1;
        self.remaining -= 1;
        Some(flag)
    }
}
