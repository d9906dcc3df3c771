//! Tile geometry and per-tile pixel work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              PyramidPlan                │
//! │   (level sizes, tile grids, factor)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          TileCoordinateSpace            │
//! │  (ordered coordinates, backpressure)    │
//! └────────────────────┬────────────────────┘
//!                      │ one coordinate per worker
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  PixelEncoder   │    │   BoxDownsampler    │
//! │  (level 0)      │    │   (levels 1..L)     │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`PyramidPlan`]: level dimensions and tile rectangles
//! - [`TileCoordinate`] / [`CoordinateOrder`]: the fixed tile issue order
//! - [`TileCoordinateSpace`]: hands coordinates to workers, bounded by the
//!   number of tiles the writer has not consumed yet
//! - [`PixelEncoder`]: plane region to raw big-endian tile bytes
//! - [`BoxDownsampler`]: integer box averaging between levels

mod coords;
mod downsample;
mod encoder;
mod plan;

pub use coords::{
    CoordinateIter, CoordinateOrder, PlaneCounts, TileCoordinate, TileCoordinateSpace, TileGrid,
};
pub use downsample::{output_size, BoxDownsampler, SampleLayout, ScaleFactor};
pub use encoder::PixelEncoder;
pub use plan::{auto_level_count, LevelInfo, PyramidPlan};
