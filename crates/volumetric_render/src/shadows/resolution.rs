//! Shadow map sizing
//!
//! Every light picks its map size from a fixed table indexed by its resolved
//! quality tier. Point lights additionally key on the largest screen
//! dimension, since six cube faces at full size would dwarf the screen itself.
//! All sizes are clamped to the backend's maximum texture size.

use serde::{Deserialize, Serialize};

/// Shadow map resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ShadowQuality {
    /// Smallest maps
    Low,
    /// Medium maps
    Medium,
    /// Large maps
    #[default]
    High,
    /// Largest maps
    VeryHigh,
}

impl ShadowQuality {
    /// Every tier from lowest to highest
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::VeryHigh];

    fn index(self) -> usize {
        self as usize
    }
}

const SPOT_RESOLUTION: [u32; 4] = [256, 512, 1024, 2048];

const DIRECTIONAL_RESOLUTION: [u32; 4] = [1024, 2048, 4096, 4096];

/// Cube face size by tier (rows) and screen max-dimension bucket (columns)
const POINT_RESOLUTION: [[u32; 5]; 4] = [
    [16, 32, 64, 128, 256],
    [32, 64, 128, 256, 512],
    [64, 128, 256, 512, 1024],
    [128, 256, 512, 1024, 1024],
];

/// Upper bounds of the screen-size buckets; anything larger uses the last column
const SCREEN_BUCKETS: [u32; 4] = [128, 256, 512, 1024];

/// Edge length of a spot light shadow map
pub fn spot_map_size(quality: ShadowQuality, max_texture_size: u32) -> u32 {
    SPOT_RESOLUTION[quality.index()].min(max_texture_size)
}

/// Edge length of the shared directional shadow map holding every cascade
pub fn directional_map_size(quality: ShadowQuality, max_texture_size: u32) -> u32 {
    DIRECTIONAL_RESOLUTION[quality.index()].min(max_texture_size)
}

/// Edge length of one point light cube face for a screen whose larger side is `max_dimension`
pub fn point_map_size(quality: ShadowQuality, max_dimension: u32, max_texture_size: u32) -> u32 {
    let bucket = SCREEN_BUCKETS
        .iter()
        .position(|limit| max_dimension <= *limit)
        .unwrap_or(SCREEN_BUCKETS.len());
    POINT_RESOLUTION[quality.index()][bucket].min(max_texture_size)
}
