use std::sync::Arc;

use log::debug;

use crate::block::{BlockView, PixelPlane};
use crate::codebook::{validate_geometry, Codebook, MacroblockRow};
use crate::codec::BlockCodec;
use crate::format::{
    uncompressed_size, BlockRef, FlagReader, FrameHeader, RefSource, FLAGS_PER_WORD, HEADER_SIZE,
    REFERENCE_SIZE,
};
use crate::motion::CausalRegion;
use crate::pixel::{ChannelOrder, Rgb};

/// Forward-only view over a frame's payload bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> anyhow::Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            anyhow::bail!(
                "truncated frame data: need {} bytes at payload offset {}, {} left",
                len,
                self.pos,
                self.data.len() - self.pos
            );
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn peek_u16(&self) -> anyhow::Result<u16> {
        match self.data.get(self.pos..self.pos + 2) {
            Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
            None => anyhow::bail!(
                "truncated frame data: need a block record at payload offset {}",
                self.pos
            ),
        }
    }

    fn read_u16(&mut self) -> anyhow::Result<u16> {
        let word = self.peek_u16()?;
        self.pos += 2;
        Ok(word)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Stateless single-frame decoder.
///
/// Validates everything it reads: header fields against the expected geometry
/// and codec, every reference against the frame bounds and the decoded-so-far
/// region, and that the payload is consumed exactly.
pub struct FrameDecoder {
    codec: Arc<dyn BlockCodec>,
}

impl FrameDecoder {
    pub fn new(codec: Arc<dyn BlockCodec>) -> Self {
        Self { codec }
    }

    /// Decode one frame of `width × height` pixels.
    ///
    /// `previous` is the previously decoded frame. It is required for
    /// predicted and repeated frames and ignored for key frames.
    pub fn decode(
        &self,
        data: &[u8],
        previous: Option<&[Rgb]>,
        width: usize,
        height: usize,
    ) -> anyhow::Result<Vec<Rgb>> {
        validate_geometry(width, height)?;
        let header = FrameHeader::from_bytes(data)?;
        if header.codec_id != self.codec.id() {
            anyhow::bail!(
                "codec mismatch: frame was written by codec {}, decoder uses {} ({})",
                header.codec_id,
                self.codec.id(),
                self.codec.name()
            );
        }
        let Some(expected_size) = uncompressed_size(width, height) else {
            anyhow::bail!("frame size {}x{} does not fit the header", width, height);
        };
        if header.uncompressed_size != expected_size {
            anyhow::bail!(
                "uncompressed size {} does not match {}x{} frame ({} bytes)",
                header.uncompressed_size,
                width,
                height,
                expected_size
            );
        }

        let needs_previous = header.is_repeated() || header.is_predicted();
        let previous = match previous {
            Some(p) if needs_previous => Some(Codebook::from_slice(p, width, height)?),
            None if needs_previous => anyhow::bail!(
                "{} frame needs a previous frame, none given",
                if header.is_repeated() {
                    "repeated"
                } else {
                    "predicted"
                }
            ),
            _ => None,
        };

        if header.is_repeated() {
            if data.len() != HEADER_SIZE {
                anyhow::bail!(
                    "repeated frame carries {} trailing bytes",
                    data.len() - HEADER_SIZE
                );
            }
            debug!("decoded repeated frame");
            return Ok(previous.map(Codebook::into_pixels).unwrap_or_default());
        }

        let order = header.channel_order();
        let mut image = Codebook::blank(width, height)?;
        let mut cursor = Cursor::new(&data[HEADER_SIZE..]);
        for mut row in image.rows_mut() {
            self.decode_row(&mut cursor, &mut row, previous.as_ref(), order)?;
        }
        if cursor.remaining() != 0 {
            anyhow::bail!(
                "{} trailing bytes after the last macroblock",
                cursor.remaining()
            );
        }
        debug!(
            "decoded {} frame, {} bytes",
            if header.is_predicted() { "P" } else { "key" },
            data.len()
        );
        Ok(image.into_pixels())
    }

    fn decode_row(
        &self,
        cursor: &mut Cursor<'_>,
        row: &mut MacroblockRow<'_>,
        previous: Option<&Codebook>,
        order: ChannelOrder,
    ) -> anyhow::Result<()> {
        let columns = row.columns();
        for first in (0..columns).step_by(FLAGS_PER_WORD) {
            let count = (columns - first).min(FLAGS_PER_WORD);
            let flags = FlagReader::new(cursor.read_u16()?, count);
            if flags.has_stray_bits() {
                anyhow::bail!(
                    "split flag word for row {} sets bits beyond its {} macroblocks",
                    row.index(),
                    count
                );
            }
            for (column, split) in (first..).zip(flags) {
                let macroblock = row.macroblock(column);
                let region = CausalRegion::new(&macroblock);
                if split {
                    for (index, child) in macroblock.children().enumerate() {
                        let region = region.with_finished_quadrants(index);
                        self.decode_block(cursor, row, previous, &child, region, order)?;
                    }
                } else {
                    self.decode_block(cursor, row, previous, &macroblock, region, order)?;
                }
            }
        }
        Ok(())
    }

    fn decode_block(
        &self,
        cursor: &mut Cursor<'_>,
        row: &mut MacroblockRow<'_>,
        previous: Option<&Codebook>,
        block: &BlockView,
        region: CausalRegion,
        order: ChannelOrder,
    ) -> anyhow::Result<()> {
        let dim = block.dimension();
        let Some(reference) = BlockRef::from_word(cursor.peek_u16()?) else {
            let record = cursor.take(self.codec.encoded_size(dim))?;
            let pixels = self.codec.decode_block(record, dim, order)?;
            return block.commit(row, &pixels);
        };
        cursor.take(REFERENCE_SIZE)?;

        let x = block.x() as i64 + reference.dx as i64;
        let y = block.y() as i64 + reference.dy as i64;
        let pixels = match reference.source {
            RefSource::Previous => {
                let Some(prev) = previous else {
                    anyhow::bail!(
                        "block at ({}, {}) references the previous frame in a key frame",
                        block.x(),
                        block.y()
                    );
                };
                if !prev.contains(dim, x, y) {
                    anyhow::bail!(
                        "block at ({}, {}) references ({}, {}) outside the previous frame",
                        block.x(),
                        block.y(),
                        x,
                        y
                    );
                }
                prev.block_at(dim, x as usize, y as usize)
            }
            RefSource::Current => {
                if !row.contains(dim, x, y) || !region.contains(dim, x, y) {
                    anyhow::bail!(
                        "block at ({}, {}) references ({}, {}) which is not decoded yet",
                        block.x(),
                        block.y(),
                        x,
                        y
                    );
                }
                row.block_at(dim, x as usize, y as usize)
            }
        };
        block.commit(row, &pixels)
    }
}

/// Decoder for a sequence of frames of one size, mirroring [`VideoEncoder`].
///
/// [`VideoEncoder`]: crate::encoder::VideoEncoder
pub struct VideoDecoder {
    decoder: FrameDecoder,
    width: usize,
    height: usize,
    previous: Option<Vec<Rgb>>,
    frames: u64,
}

impl VideoDecoder {
    pub fn new(codec: Arc<dyn BlockCodec>, width: usize, height: usize) -> anyhow::Result<Self> {
        validate_geometry(width, height)?;
        Ok(Self {
            decoder: FrameDecoder::new(codec),
            width,
            height,
            previous: None,
            frames: 0,
        })
    }

    /// Decode the next frame. The result stays valid until the next call.
    pub fn decode_frame(&mut self, data: &[u8]) -> anyhow::Result<&[Rgb]> {
        let image =
            self.decoder
                .decode(data, self.previous.as_deref(), self.width, self.height)?;
        self.frames += 1;
        Ok(self.previous.insert(image).as_slice())
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    /// Last decoded frame.
    pub fn current_frame(&self) -> Option<&[Rgb]> {
        self.previous.as_deref()
    }
}
