//! Blender configuration.
//!
//! # Environment Variables
//!
//! - `STITCH_PYRAMID_LEVELS` - Pyramid level count (clamped to 1-4)
//! - `STITCH_BLEND_UV` - Blend the chroma plane ("0"/"false" to disable)

use std::env;

use tracing::warn;

/// Deepest supported pyramid.
pub const PYRAMID_MAX_LEVEL: usize = 4;

/// Number of blended inputs.
pub const BLENDER_IMAGE_NUM: usize = 2;

/// Merge window position and width granularity in pixels.
pub const MERGE_WINDOW_ALIGN: u32 = 8;

/// 8-bit samples per packed `RGBA/UnsignedInt16` texel.
pub const PACKED_U8_SAMPLES: u32 = 8;

/// 16-bit samples per packed `RGBA/SignedInt16` texel.
pub const PACKED_I16_SAMPLES: u32 = 4;

/// Default work-group size of every pyramid kernel.
pub const DEFAULT_WORK_GROUP: [usize; 2] = [16, 2];

/// Default number of pooled output frames.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Construction parameters of a [`crate::PyramidBlender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlenderConfig {
    /// Pyramid levels (1..=4).
    pub levels: usize,
    /// Blend the interleaved chroma plane too.
    pub need_uv: bool,
    /// Local work-group size for dispatches.
    pub work_group: [usize; 2],
    /// Output frames kept by the handler's pool.
    pub pool_size: usize,
}

impl Default for BlenderConfig {
    fn default() -> Self {
        Self {
            levels: 1,
            need_uv: true,
            work_group: DEFAULT_WORK_GROUP,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl BlenderConfig {
    /// Creates a config, clamping `levels` into `1..=4`.
    pub fn new(levels: usize, need_uv: bool) -> Self {
        Self {
            levels: clamp_levels(levels),
            need_uv,
            ..Self::default()
        }
    }

    /// Default config with environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(levels) = var("STITCH_PYRAMID_LEVELS").and_then(|v| v.trim().parse::<usize>().ok()) {
            config.levels = clamp_levels(levels);
        }
        if let Some(v) = var("STITCH_BLEND_UV") {
            let v = v.trim();
            config.need_uv = !(v == "0" || v.eq_ignore_ascii_case("false"));
        }
        config
    }

    /// Sets the local work-group size.
    pub fn with_work_group(mut self, work_group: [usize; 2]) -> Self {
        self.work_group = work_group;
        self
    }

    /// Sets the output pool size (at least 1).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}

/// Clamps a requested level count into `1..=PYRAMID_MAX_LEVEL`.
pub fn clamp_levels(levels: usize) -> usize {
    let clamped = levels.clamp(1, PYRAMID_MAX_LEVEL);
    if clamped != levels {
        warn!(requested = levels, levels = clamped, "pyramid level count clamped");
    }
    clamped
}
