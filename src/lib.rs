//! # Pyramid Export
//!
//! Converts multi-dimensional raster images (channels, Z sections and time
//! points of Y×X planes) into a single tiled, multi-resolution container.
//!
//! Level 0 is encoded straight from the source. Every coarser level is
//! box-downsampled from the previous level, which is read back from a
//! per-level scratch file, so memory stays bounded by the number of tiles in
//! flight rather than by the image size.
//!
//! ## Features
//!
//! - **Subset expressions**: select channels, Z sections and time points with
//!   a compact range grammar (`"0,2"`, `"-1"`, `"0:2:10"`)
//! - **Bounded memory**: a fixed worker pool with backpressure on the number
//!   of computed but unwritten tiles
//! - **Deterministic output**: tiles are written in a fixed order, so the file
//!   is byte-identical for any thread count
//! - **Cancellation**: a [`CancelHandle`] stops an export from any thread and
//!   removes every partial file
//!
//! ## Architecture
//!
//! - [`subset`] - Axis subset expressions
//! - [`source`] - Image source trait, pixel types, in-memory and raw stack sources
//! - [`tile`] - Pyramid geometry, coordinate space, encoder and downsampler
//! - [`container`] - Container format traits and the raw "PYRM" format
//! - [`export`] - Export orchestration
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use image::GrayImage;
//! use pyramid_export::{export, ExportOptions, InMemorySource, PixelPlane};
//!
//! let plane = PixelPlane::Gray8(GrayImage::new(10_000, 8_000));
//! let source = InMemorySource::single(plane);
//!
//! let summary = export(&source, ExportOptions::new("out.pyrm").with_tile_size(256, 256))?;
//! assert_eq!(summary.levels[0].width, 10_000);
//! # Ok::<(), pyramid_export::ExportError>(())
//! ```

pub mod cancel;
pub mod config;
pub mod container;
pub mod error;
pub mod export;
pub mod region;
pub mod source;
pub mod subset;
pub mod tile;

// Re-export commonly used types
pub use cancel::CancelHandle;
pub use config::{Cli, Command, ExportConfig, InspectConfig, PixelTypeArg};
pub use container::{
    ContainerDescriptor, ContainerFormat, ContainerHeader, ContainerReader, ContainerWriter,
    RawContainerFormat, RawContainerReader, RawContainerWriter,
};
pub use error::{
    ContainerError, DownsampleError, EncodeError, ExportError, RangeParseError, SourceError,
};
pub use export::{export, ExportOptions, ExportProgress, ExportSummary, PyramidExporter};
pub use region::Rect;
pub use source::{
    ImageDimensions, ImageSource, InMemorySource, PixelKind, PixelPlane, PixelType,
    PlaneSelector, RawStackLayout, RawStackSource,
};
pub use subset::{parse_range, AxisRange, AxisSubsets, SubsetExpressions};
pub use tile::{
    BoxDownsampler, CoordinateOrder, LevelInfo, PixelEncoder, PyramidPlan, SampleLayout,
    ScaleFactor, TileCoordinate, TileCoordinateSpace,
};
