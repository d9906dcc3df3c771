//! Tiled multi-resolution containers.
//!
//! The exporter writes through the [`ContainerWriter`] trait and reads
//! previous levels back through [`ContainerReader`]. Both the final output
//! and the per-level scratch files use the same format, selected through a
//! [`ContainerFormat`]:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            PyramidExporter              │
//! └──────────┬──────────────────┬───────────┘
//!            │ create()         │ open()
//!            ▼                  ▼
//! ┌───────────────────┐ ┌───────────────────┐
//! │  ContainerWriter  │ │  ContainerReader  │
//! │  (serial writer)  │ │  (one per worker) │
//! └─────────┬─────────┘ └─────────┬─────────┘
//!           │                     │
//!           └──────────┬──────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   RawContainerFormat ("PYRM" files)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Writers receive levels in order, then tiles in issue order. Tiles passed
//! to `write_tile` are exact tile-grid rectangles, edge-clipped.

mod file;
mod header;

pub use file::{RawContainerFormat, RawContainerReader, RawContainerWriter};
pub use header::{ContainerHeader, LevelEntry, FIXED_HEADER_SIZE, FORMAT_VERSION, LEVEL_ENTRY_SIZE, MAGIC};

use std::path::Path;

use serde::Serialize;

use crate::error::ContainerError;
use crate::region::Rect;
use crate::source::PixelKind;

/// Container-wide properties fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerDescriptor {
    pub pixel_kind: PixelKind,
    pub plane_count: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// A container file format.
pub trait ContainerFormat: Send + Sync {
    type Writer: ContainerWriter;
    type Reader: ContainerReader;

    /// Create (or truncate) a container at `path`.
    fn create(
        &self,
        path: &Path,
        descriptor: &ContainerDescriptor,
    ) -> Result<Self::Writer, ContainerError>;

    /// Open an existing container for reading.
    fn open(&self, path: &Path) -> Result<Self::Reader, ContainerError>;
}

/// Sequential writer for one container.
pub trait ContainerWriter: Send {
    /// Declare the size of the next level. Levels are declared in order,
    /// starting at 0, before the first tile is written.
    fn declare_level(&mut self, level: usize, width: u32, height: u32)
        -> Result<(), ContainerError>;

    /// Store the bytes of one tile.
    fn write_tile(
        &mut self,
        level: usize,
        plane: usize,
        rect: Rect,
        data: &[u8],
    ) -> Result<(), ContainerError>;

    /// Flush and finalize the file. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), ContainerError>;
}

/// Random-access reader for one container.
pub trait ContainerReader: Send {
    fn pixel_kind(&self) -> PixelKind;

    fn plane_count(&self) -> usize;

    fn level_count(&self) -> usize;

    /// `(width, height)` of a level, if it exists.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Read an arbitrary rectangle of one plane, row-major at the stored
    /// sample width.
    fn read_region(
        &mut self,
        level: usize,
        plane: usize,
        rect: Rect,
    ) -> Result<Vec<u8>, ContainerError>;
}
