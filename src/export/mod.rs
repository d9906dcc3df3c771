//! Pyramid export.
//!
//! Level 0 is encoded from the source image; each coarser level is
//! box-downsampled from the previous one, read back from a scratch file. At
//! most `max_tiles_in_queue` tiles are held in memory at once, whatever the
//! image size.
//!
//! # Example
//!
//! ```no_run
//! use pyramid_export::export::{export, ExportOptions};
//! use pyramid_export::source::{ImageDimensions, PixelType, RawStackLayout, RawStackSource};
//!
//! let layout = RawStackLayout {
//!     dimensions: ImageDimensions { size_x: 20_000, size_y: 15_000, size_c: 3, size_z: 1, size_t: 1 },
//!     pixel_type: PixelType::Uint16,
//!     little_endian: true,
//! };
//! let source = RawStackSource::open("stack.raw", layout)?;
//!
//! let options = ExportOptions::new("stack.pyrm")
//!     .with_channels("0,2")
//!     .with_tile_size(256, 256);
//! let summary = export(&source, options)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod options;
mod orchestrator;
mod pending;
mod worker;

pub use options::{
    default_threads, ExportOptions, DEFAULT_DOWNSAMPLE, DEFAULT_MAX_TILES_IN_QUEUE,
    DEFAULT_TILE_SIZE,
};
pub use orchestrator::{export, ExportProgress, ExportSummary, PyramidExporter};
