use std::path::PathBuf;

use thiserror::Error;

use crate::source::PixelType;

/// Errors produced while parsing an axis subset expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RangeParseError {
    /// A block contained something that is not a number
    #[error("Invalid number '{part}' in block '{block}'")]
    InvalidNumber { block: String, part: String },

    /// A block had more than three colon-separated parts
    #[error("Invalid block '{block}': expected 1 to 3 colon-separated parts, got {parts}")]
    InvalidBlock { block: String, parts: usize },

    /// `a:b` with `b < a`
    #[error("Range end {end} is smaller than start {start}")]
    ReversedRange { start: f64, end: f64 },

    /// `a:step:b` with a zero step
    #[error("Step must not be zero in block '{block}'")]
    ZeroStep { block: String },

    /// The sign of the step disagrees with the direction from start to end
    #[error("Step {step} cannot go from {start} to {end}")]
    StepDirection { start: f64, step: f64, end: f64 },

    /// A generated value was negative
    #[error("Negative index {value} (axis length {length})")]
    NegativeIndex { value: f64, length: u32 },

    /// A generated index is past the end of the axis
    #[error("Index {index} out of bounds for axis length {length}")]
    OutOfBounds { index: u64, length: u32 },

    /// A single block expanded to an unreasonable number of indices
    #[error("Block '{block}' expands to more than {limit} indices")]
    TooManyIndices { block: String, limit: usize },
}

/// Errors produced while encoding a pixel region to bytes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// The source pixel type has no supported byte encoding
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(PixelType),

    /// The encoded region would not fit a 32-bit signed length
    #[error("Region {width}x{height} with {bytes_per_pixel} bytes per pixel exceeds the maximum buffer length")]
    RegionTooLarge {
        width: u32,
        height: u32,
        bytes_per_pixel: usize,
    },

    /// The requested rectangle lies outside the plane
    #[error("Region {x},{y} {width}x{height} outside plane of {plane_width}x{plane_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        plane_width: u32,
        plane_height: u32,
    },

    /// The plane does not hold the pixel kind being exported
    #[error("Plane holds {actual} pixels but {expected} was requested")]
    KindMismatch { expected: String, actual: String },
}

/// Errors produced by the box-average downsampler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DownsampleError {
    /// Scale factors must be integers >= 1
    #[error("Invalid scale factor {0}: must be an integer >= 1")]
    InvalidScaleFactor(f64),

    /// Only 1, 2 and 4 byte samples can be averaged
    #[error("Unsupported sample width: {0} bytes")]
    UnsupportedSampleWidth(usize),

    /// The source buffer does not match the declared geometry
    #[error("Buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

/// Errors raised by an image source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A plane index is outside the image
    #[error("Plane c={c} z={z} t={t} out of range")]
    PlaneOutOfRange { c: u32, z: u32, t: u32 },

    /// A rectangle is outside the image plane
    #[error("Region {x},{y} {width}x{height} outside image of {size_x}x{size_y}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        size_x: u32,
        size_y: u32,
    },

    /// The backing data does not match the declared dimensions
    #[error("Source holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The source cannot materialize this pixel type
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(PixelType),
}

/// Errors raised while writing or reading a tiled container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Underlying file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a container file
    #[error("Invalid container magic bytes: {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Container written by an incompatible version
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),

    /// File too small to hold its declared header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Header carries an unknown pixel kind code
    #[error("Unknown pixel kind code: {0}")]
    UnknownPixelKind(u8),

    /// Header declares an empty tile size
    #[error("Invalid tile size {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    /// Levels must be declared in increasing order starting at 0
    #[error("Level {got} declared out of order, expected level {expected}")]
    LevelOrder { expected: usize, got: usize },

    /// Levels cannot be declared once tiles have been written
    #[error("Container layout is sealed; cannot declare level {0}")]
    LayoutSealed(usize),

    /// Level index outside the declared levels
    #[error("Level {level} out of range (container has {count} levels)")]
    LevelOutOfRange { level: usize, count: usize },

    /// Plane index outside the declared planes
    #[error("Plane {plane} out of range (container has {count} planes)")]
    PlaneOutOfRange { plane: usize, count: usize },

    /// Tile rectangle does not match the level's tile grid
    #[error("Rectangle {x},{y} {width}x{height} is not a tile of level {level}")]
    NotATile {
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Region extends past the level bounds
    #[error("Region {x},{y} {width}x{height} outside level {level}")]
    RegionOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Tile payload length does not match the tile geometry
    #[error("Tile holds {actual} bytes, expected {expected}")]
    TileSizeMismatch { expected: usize, actual: usize },

    /// Writer used after `close`
    #[error("Container writer already closed")]
    Closed,
}

/// Top-level error returned by an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A subset expression could not be parsed
    #[error("Invalid {axis} range: {source}")]
    Range {
        axis: &'static str,
        #[source]
        source: RangeParseError,
    },

    /// The source pixel type cannot be exported
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(PixelType),

    /// Encoding a level-0 tile failed
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Downsampling a tile failed
    #[error("Downsample error: {0}")]
    Downsample(#[from] DownsampleError),

    /// Reading the source image failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing or reading a container failed
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Filesystem error outside the container (temp directory, cleanup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Options rejected during setup
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    /// Output path already exists and overwriting was not requested
    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// A coordinate does not address a tile of the pyramid
    #[error("Tile ({row}, {col}) is not part of level {level}")]
    InvalidTile { level: usize, row: u32, col: u32 },

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// The export was canceled through its cancel handle
    #[error("Export canceled")]
    Canceled,
}

impl ExportError {
    /// Whether this error is a cancellation rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ExportError::Canceled)
    }
}
