//! Command-line configuration.
//!
//! This module provides the CLI of the `pyramid-export` binary:
//! - `export`: build a pyramid from a raw planar stack
//! - `inspect`: print the header of an existing container
//!
//! # Environment Variables
//!
//! Every option can also be set through an environment variable with the
//! `PYRAMID_` prefix:
//!
//! - `PYRAMID_INPUT` - Raw stack to read
//! - `PYRAMID_OUTPUT` - Container to write
//! - `PYRAMID_SIZE_X` .. `PYRAMID_SIZE_T` - Stack dimensions
//! - `PYRAMID_PIXEL_TYPE` - Sample type of the stack
//! - `PYRAMID_CHANNELS`, `PYRAMID_Z_RANGE`, `PYRAMID_T_RANGE` - Subset expressions
//! - `PYRAMID_TILE_SIZE` - Tile edge length (default: 512)
//! - `PYRAMID_DOWNSAMPLE` - Factor between levels (default: 2)
//! - `PYRAMID_LEVELS` - Explicit level count
//! - `PYRAMID_THREADS` - Worker threads, 0 for serial (default: CPU count)
//! - `PYRAMID_MAX_TILES_IN_QUEUE` - In-flight tile bound (default: 16)
//! - `PYRAMID_TEMP_DIR` - Scratch directory

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::export::{
    ExportOptions, DEFAULT_DOWNSAMPLE, DEFAULT_MAX_TILES_IN_QUEUE, DEFAULT_TILE_SIZE,
};
use crate::source::{ImageDimensions, PixelType, RawStackLayout};
use crate::subset::SubsetExpressions;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pyramid Export - tiled multi-resolution export of multi-dimensional images.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Export a raw planar stack as a tiled pyramid.
    Export(ExportConfig),

    /// Print the header of a pyramid container.
    Inspect(InspectConfig),
}

/// Sample type of a raw stack.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelTypeArg {
    U8,
    U16,
    F32,
    Rgb8,
    Rgba8,
    I8,
    I16,
    I32,
    U32,
    F64,
}

impl From<PixelTypeArg> for PixelType {
    fn from(arg: PixelTypeArg) -> Self {
        match arg {
            PixelTypeArg::U8 => PixelType::Uint8,
            PixelTypeArg::U16 => PixelType::Uint16,
            PixelTypeArg::F32 => PixelType::Float32,
            PixelTypeArg::Rgb8 => PixelType::Rgb8,
            PixelTypeArg::Rgba8 => PixelType::Rgba8,
            PixelTypeArg::I8 => PixelType::Int8,
            PixelTypeArg::I16 => PixelType::Int16,
            PixelTypeArg::I32 => PixelType::Int32,
            PixelTypeArg::U32 => PixelType::Uint32,
            PixelTypeArg::F64 => PixelType::Float64,
        }
    }
}

// =============================================================================
// Export Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    // =========================================================================
    // Input
    // =========================================================================
    /// Raw planar stack (XYZCT order, no header).
    #[arg(short, long, env = "PYRAMID_INPUT")]
    pub input: PathBuf,

    /// Plane width in pixels.
    #[arg(long, env = "PYRAMID_SIZE_X")]
    pub size_x: u32,

    /// Plane height in pixels.
    #[arg(long, env = "PYRAMID_SIZE_Y")]
    pub size_y: u32,

    /// Number of channels.
    #[arg(long, default_value_t = 1, env = "PYRAMID_SIZE_C")]
    pub size_c: u32,

    /// Number of Z sections.
    #[arg(long, default_value_t = 1, env = "PYRAMID_SIZE_Z")]
    pub size_z: u32,

    /// Number of time points.
    #[arg(long, default_value_t = 1, env = "PYRAMID_SIZE_T")]
    pub size_t: u32,

    /// Sample type of the stack.
    #[arg(long, value_enum, default_value_t = PixelTypeArg::U8, env = "PYRAMID_PIXEL_TYPE")]
    pub pixel_type: PixelTypeArg,

    /// Multi-byte samples are little-endian (default: big-endian).
    #[arg(long, default_value_t = false, env = "PYRAMID_LITTLE_ENDIAN")]
    pub little_endian: bool,

    // =========================================================================
    // Subsets
    // =========================================================================
    /// Channels to export, e.g. "0,2" or "1:3". Empty selects all.
    #[arg(long, default_value = "", env = "PYRAMID_CHANNELS")]
    pub channels: String,

    /// Z sections to export, e.g. "0:2:10" or "-1". Empty selects all.
    #[arg(long, default_value = "", env = "PYRAMID_Z_RANGE")]
    pub z_range: String,

    /// Time points to export. Empty selects all.
    #[arg(long, default_value = "", env = "PYRAMID_T_RANGE")]
    pub t_range: String,

    // =========================================================================
    // Pyramid
    // =========================================================================
    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PYRAMID_TILE_SIZE")]
    pub tile_size: u32,

    /// Integer downsampling factor between levels.
    #[arg(long, default_value_t = DEFAULT_DOWNSAMPLE, env = "PYRAMID_DOWNSAMPLE")]
    pub downsample: u32,

    /// Number of resolution levels. Chosen from the image size if omitted.
    #[arg(long, env = "PYRAMID_LEVELS")]
    pub levels: Option<u32>,

    // =========================================================================
    // Execution
    // =========================================================================
    /// Worker threads; 0 runs everything on one thread. Defaults to the CPU count.
    #[arg(long, env = "PYRAMID_THREADS")]
    pub threads: Option<usize>,

    /// Maximum tiles computed but not yet written.
    #[arg(long, default_value_t = DEFAULT_MAX_TILES_IN_QUEUE, env = "PYRAMID_MAX_TILES_IN_QUEUE")]
    pub max_tiles_in_queue: usize,

    /// Directory for per-level scratch files (default: next to the output).
    #[arg(long, env = "PYRAMID_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    // =========================================================================
    // Output
    // =========================================================================
    /// Container file to write.
    #[arg(short, long, env = "PYRAMID_OUTPUT")]
    pub output: PathBuf,

    /// Replace an existing output file.
    #[arg(long, default_value_t = false, env = "PYRAMID_OVERWRITE")]
    pub overwrite: bool,

    /// Print the summary as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExportConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.size_x == 0 || self.size_y == 0 {
            return Err("size_x and size_y must be greater than 0".to_string());
        }
        if self.size_c == 0 || self.size_z == 0 || self.size_t == 0 {
            return Err("size_c, size_z and size_t must be greater than 0".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.downsample == 0 {
            return Err("downsample must be greater than 0".to_string());
        }
        if self.levels == Some(0) {
            return Err("levels must be greater than 0".to_string());
        }
        if self.max_tiles_in_queue == 0 {
            return Err("max_tiles_in_queue must be greater than 0".to_string());
        }
        if self.input == self.output {
            return Err("input and output must be different files".to_string());
        }
        Ok(())
    }

    /// Layout of the input stack.
    pub fn layout(&self) -> RawStackLayout {
        RawStackLayout {
            dimensions: ImageDimensions {
                size_x: self.size_x,
                size_y: self.size_y,
                size_c: self.size_c,
                size_z: self.size_z,
                size_t: self.size_t,
            },
            pixel_type: self.pixel_type.into(),
            little_endian: self.little_endian,
        }
    }

    /// Library options for this export.
    pub fn export_options(&self) -> ExportOptions {
        let mut options = ExportOptions::new(&self.output)
            .with_tile_size(self.tile_size, self.tile_size)
            .with_downsample(self.downsample)
            .with_max_tiles_in_queue(self.max_tiles_in_queue)
            .with_overwrite(self.overwrite);
        options.subsets = SubsetExpressions {
            channels: self.channels.clone(),
            z: self.z_range.clone(),
            t: self.t_range.clone(),
        };
        if let Some(levels) = self.levels {
            options = options.with_resolution_levels(levels);
        }
        if let Some(threads) = self.threads {
            options = options.with_threads(threads);
        }
        if let Some(dir) = &self.temp_dir {
            options = options.with_temp_dir(dir);
        }
        options
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Container file to inspect.
    pub path: PathBuf,

    /// Print the header as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
