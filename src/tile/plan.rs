//! Pyramid geometry.
//!
//! Every level is derived from level 0 by integer division:
//!
//! ```text
//! level r size = floor(level0 size / downsample^r)
//! ```
//!
//! Because `floor(floor(n / a) / b) == floor(n / (a * b))`, a tile of level r
//! always maps onto a region of level r-1 that is exactly `downsample` times
//! larger and lies inside that level.

use serde::Serialize;

use super::downsample::ScaleFactor;
use crate::error::{EncodeError, ExportError};
use crate::region::Rect;

// =============================================================================
// LevelInfo
// =============================================================================

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    /// Level index (0 = full resolution)
    pub level: usize,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,
}

impl LevelInfo {
    fn new(level: usize, width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            level,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
        }
    }

    /// Tiles per plane.
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }

    /// Pixel rectangle of a tile.
    ///
    /// Edge tiles are clipped to the level bounds. Returns `None` if the tile
    /// is outside the grid.
    pub fn tile_rect(&self, row: u32, col: u32) -> Option<Rect> {
        if col >= self.tiles_x || row >= self.tiles_y {
            return None;
        }
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        Some(Rect::new(
            x,
            y,
            self.tile_width.min(self.width - x),
            self.tile_height.min(self.height - y),
        ))
    }
}

// =============================================================================
// PyramidPlan
// =============================================================================

/// Immutable per-level geometry of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidPlan {
    levels: Vec<LevelInfo>,
    tile_width: u32,
    tile_height: u32,
    downsample: ScaleFactor,
}

impl PyramidPlan {
    /// Build the plan for a `width` x `height` level 0.
    ///
    /// With `requested_levels == None` the level count is chosen by
    /// [`auto_level_count`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` for empty images, zero tile sizes, a zero
    /// level count, or a level count that would shrink a level to nothing.
    pub fn new(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        downsample: ScaleFactor,
        requested_levels: Option<u32>,
    ) -> Result<Self, ExportError> {
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidOptions(format!(
                "image plane is empty ({}x{})",
                width, height
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(ExportError::InvalidOptions(
                "tile size must be greater than 0".to_string(),
            ));
        }

        let count = match requested_levels {
            Some(0) => {
                return Err(ExportError::InvalidOptions(
                    "resolution level count must be greater than 0".to_string(),
                ))
            }
            Some(n) => n as usize,
            None => auto_level_count(width, height, tile_width, tile_height, downsample),
        };

        let factor = downsample.get();
        let mut levels = Vec::with_capacity(count);
        let (mut w, mut h) = (width, height);
        for level in 0..count {
            if level > 0 {
                w /= factor;
                h /= factor;
            }
            if w == 0 || h == 0 {
                return Err(ExportError::InvalidOptions(format!(
                    "{} resolution levels with downsample {} shrink a {}x{} image to nothing",
                    count, factor, width, height
                )));
            }
            levels.push(LevelInfo::new(level, w, h, tile_width, tile_height));
        }

        Ok(Self {
            levels,
            tile_width,
            tile_height,
            downsample,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> Option<&LevelInfo> {
        self.levels.get(level)
    }

    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn downsample(&self) -> ScaleFactor {
        self.downsample
    }

    /// Tiles per plane summed over every level.
    pub fn tiles_per_plane(&self) -> u64 {
        self.levels.iter().map(LevelInfo::tile_count).sum()
    }

    /// Region of level `level - 1` that downsamples into `rect` of `level`.
    ///
    /// Returns `None` for level 0 or unknown levels.
    pub fn source_rect(&self, level: usize, rect: Rect) -> Option<Rect> {
        if level == 0 {
            return None;
        }
        let previous = self.levels.get(level - 1)?;
        let factor = self.downsample.get() as u64;

        let x = rect.x as u64 * factor;
        let y = rect.y as u64 * factor;
        let width = (rect.width as u64 * factor).min((previous.width as u64).checked_sub(x)?);
        let height = (rect.height as u64 * factor).min((previous.height as u64).checked_sub(y)?);
        Some(Rect::new(x as u32, y as u32, width as u32, height as u32))
    }

    /// Check that a full tile fits a 32-bit signed buffer length.
    pub fn check_tile_bytes(&self, bytes_per_pixel: usize) -> Result<usize, EncodeError> {
        let full = Rect::new(0, 0, self.tile_width, self.tile_height);
        match full.byte_len(bytes_per_pixel) {
            Some(len) if len <= i32::MAX as usize => Ok(len),
            _ => Err(EncodeError::RegionTooLarge {
                width: self.tile_width,
                height: self.tile_height,
                bytes_per_pixel,
            }),
        }
    }
}

/// Number of levels needed so the coarsest level is small.
///
/// Levels are added while the last one is still larger than
/// `tile / downsample` in either dimension, and never past a level that
/// would have zero pixels. A downsample factor of 1 always gives one level.
pub fn auto_level_count(
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    downsample: ScaleFactor,
) -> usize {
    let factor = downsample.get();
    if factor == 1 {
        return 1;
    }

    let (mut w, mut h) = (width, height);
    let mut count = 1;
    while w > tile_width / factor || h > tile_height / factor {
        let (next_w, next_h) = (w / factor, h / factor);
        if next_w == 0 || next_h == 0 {
            break;
        }
        w = next_w;
        h = next_h;
        count += 1;
    }
    count
}

// =============================================================================
// Tests
// =============================================================================
