mod dxt;
mod linefit;

pub use dxt::DxtCodec;

use dxtv_core::format::CODEC_DXT;
use dxtv_core::BlockCodec;
use std::sync::Arc;

/// Resolve a block codec from the `codec_id` stored in a frame header.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn BlockCodec>> {
    match id {
        CODEC_DXT => Ok(Arc::new(DxtCodec)),
        _ => anyhow::bail!("unknown codec id {}; supported: {} (dxt)", id, CODEC_DXT),
    }
}
