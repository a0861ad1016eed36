use serde::{Deserialize, Serialize};

use crate::pixel::ChannelOrder;

/// Quality used when none is configured.
pub const DEFAULT_QUALITY: f64 = 90.0;

/// Largest accepted key frame interval.
pub const MAX_KEY_FRAME_INTERVAL: u32 = 60;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// 0 (smallest output) to 100 (best reconstruction).
    pub quality: f64,
    /// Store block codec endpoints with red and blue swapped.
    pub swap_channels: bool,
    /// Force a key frame every N frames in a sequence (0 = only the first).
    pub key_frame_interval: u32,
    /// Encode macroblock rows on the rayon thread pool.
    pub parallel: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            swap_channels: false,
            key_frame_interval: 0,
            parallel: true,
        }
    }
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_swap_channels(mut self, swap: bool) -> Self {
        self.swap_channels = swap;
        self
    }

    pub fn with_key_frame_interval(mut self, interval: u32) -> Self {
        self.key_frame_interval = interval;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=100.0).contains(&self.quality) {
            anyhow::bail!("quality {} outside [0, 100]", self.quality);
        }
        if self.key_frame_interval > MAX_KEY_FRAME_INTERVAL {
            anyhow::bail!(
                "key frame interval {} outside [0, {}]",
                self.key_frame_interval,
                MAX_KEY_FRAME_INTERVAL
            );
        }
        Ok(())
    }

    /// Per-block error a reference or codec block must stay below:
    /// `((100 - quality) / 100)²`.
    pub fn allowed_error(&self) -> f64 {
        let slack = (100.0 - self.quality) / 100.0;
        slack * slack
    }

    pub fn channel_order(&self) -> ChannelOrder {
        if self.swap_channels {
            ChannelOrder::Bgr
        } else {
            ChannelOrder::Rgb
        }
    }
}
