//! Configuration for the frame pool and the delta store

use serde::{Deserialize, Serialize};

/// Configuration for the temporal frame pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Scrub window in seconds: entries whose coverage ended earlier than
    /// this far before the latest push become evictable.
    pub retention_secs: f64,
    /// Memory budget for retained frames, in megabytes.
    pub budget_mb: u64,
    /// Expected producer frame rate; used as the default export rate.
    pub fps_hint: u32,
    /// Quick-lane capacity in slots (rounded up to a power of two).
    pub channel_capacity: usize,
    /// Collapse the history to a single frame while the scene is static.
    pub single_static: bool,
    /// How long a static run must last before the collapse kicks in, so a
    /// brief pause does not wipe the history.
    pub static_grace_secs: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retention_secs: 300.0,
            budget_mb: 1024,
            fps_hint: 30,
            channel_capacity: 2048,
            single_static: true,
            static_grace_secs: 1.0,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention_secs(mut self, seconds: f64) -> Self {
        self.retention_secs = seconds;
        self
    }

    pub fn with_budget_mb(mut self, mb: u64) -> Self {
        self.budget_mb = mb;
        self
    }

    pub fn with_fps_hint(mut self, fps: u32) -> Self {
        self.fps_hint = fps;
        self
    }

    pub fn with_channel_capacity(mut self, slots: usize) -> Self {
        self.channel_capacity = slots;
        self
    }

    pub fn with_single_static(mut self, enabled: bool, grace_secs: f64) -> Self {
        self.single_static = enabled;
        self.static_grace_secs = grace_secs;
        self
    }

    /// Memory budget in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_mb * 1024 * 1024
    }
}

/// Configuration for the delta store and its patch policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Memory budget for stored entries, in megabytes.
    pub budget_mb: u64,
    /// Tile width in pixels; zero is treated as one.
    pub tile_width: u32,
    /// Tile height in pixels; zero is treated as one.
    pub tile_height: u32,
    /// A patch is kept only while its byte size stays at or below this
    /// fraction of the full frame.
    pub patch_byte_cutoff: f64,
    /// Changed-tile coverage at or above this forces a new base.
    pub big_change_cutoff: f64,
    /// Allow lossy RGB565 color demotion for patch tiles.
    pub allow_demotion: bool,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            budget_mb: 512,
            tile_width: 64,
            tile_height: 32,
            patch_byte_cutoff: 0.55,
            big_change_cutoff: 0.35,
            allow_demotion: true,
        }
    }
}

impl DeltaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget_mb(mut self, mb: u64) -> Self {
        self.budget_mb = mb;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_patch_byte_cutoff(mut self, ratio: f64) -> Self {
        self.patch_byte_cutoff = ratio;
        self
    }

    pub fn with_big_change_cutoff(mut self, ratio: f64) -> Self {
        self.big_change_cutoff = ratio;
        self
    }

    pub fn with_demotion(mut self, enabled: bool) -> Self {
        self.allow_demotion = enabled;
        self
    }

    /// Memory budget in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_mb * 1024 * 1024
    }

    /// Effective tile size in pixels; zero config values count as one.
    pub fn tile_size(&self) -> (usize, usize) {
        (
            self.tile_width.max(1) as usize,
            self.tile_height.max(1) as usize,
        )
    }

    /// Tile grid dimensions covering a `width` by `height` frame.
    ///
    /// Edge tiles are clipped to the frame, so the grid always covers the
    /// whole image.
    pub fn tile_grid(&self, width: u32, height: u32) -> (usize, usize) {
        let (tile_w, tile_h) = self.tile_size();
        (
            (width as usize).div_ceil(tile_w),
            (height as usize).div_ceil(tile_h),
        )
    }
}
