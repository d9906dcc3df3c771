//! Export options.

use std::path::{Path, PathBuf};

use crate::error::{DownsampleError, ExportError};
use crate::subset::SubsetExpressions;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default downsampling factor between levels.
pub const DEFAULT_DOWNSAMPLE: u32 = 2;

/// Default bound on tiles issued but not yet written.
pub const DEFAULT_MAX_TILES_IN_QUEUE: usize = 16;

/// Worker thread count used when none is given.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Options controlling a pyramid export.
///
/// # Example
///
/// ```
/// use pyramid_export::export::ExportOptions;
///
/// let options = ExportOptions::new("out.pyrm")
///     .with_tile_size(256, 256)
///     .with_threads(4)
///     .with_channels("0,2");
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Channel, Z and time subset expressions
    pub subsets: SubsetExpressions,

    pub tile_width: u32,

    pub tile_height: u32,

    /// Integer factor between consecutive levels
    pub downsample: u32,

    /// Explicit level count; chosen from the image size when `None`
    pub resolution_levels: Option<u32>,

    /// Worker threads; 0 computes every tile on the writer thread
    pub threads: usize,

    /// Maximum tiles issued to workers but not yet written
    pub max_tiles_in_queue: usize,

    pub output: PathBuf,

    /// Directory for per-level scratch files; next to `output` when `None`
    pub temp_dir: Option<PathBuf>,

    /// Replace an existing output file
    pub overwrite: bool,
}

impl ExportOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            subsets: SubsetExpressions::all(),
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            downsample: DEFAULT_DOWNSAMPLE,
            resolution_levels: None,
            threads: default_threads(),
            max_tiles_in_queue: DEFAULT_MAX_TILES_IN_QUEUE,
            output: output.into(),
            temp_dir: None,
            overwrite: false,
        }
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_downsample(mut self, factor: u32) -> Self {
        self.downsample = factor;
        self
    }

    pub fn with_resolution_levels(mut self, levels: u32) -> Self {
        self.resolution_levels = Some(levels);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_tiles_in_queue(mut self, max: usize) -> Self {
        self.max_tiles_in_queue = max;
        self
    }

    pub fn with_channels(mut self, expression: impl Into<String>) -> Self {
        self.subsets.channels = expression.into();
        self
    }

    pub fn with_z(mut self, expression: impl Into<String>) -> Self {
        self.subsets.z = expression.into();
        self
    }

    pub fn with_t(mut self, expression: impl Into<String>) -> Self {
        self.subsets.t = expression.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Directory that will hold the per-level scratch files.
    pub fn scratch_parent(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => dir.clone(),
            None => self
                .output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Check the options that do not depend on the source image.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ExportError::InvalidOptions(format!(
                "tile size must be at least 1x1, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        if self.downsample == 0 {
            return Err(DownsampleError::InvalidScaleFactor(0.0).into());
        }
        if self.max_tiles_in_queue == 0 {
            return Err(ExportError::InvalidOptions(
                "max_tiles_in_queue must be at least 1".to_string(),
            ));
        }
        if self.resolution_levels == Some(0) {
            return Err(ExportError::InvalidOptions(
                "resolution level count must be at least 1".to_string(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ExportError::InvalidOptions(
                "output path is empty".to_string(),
            ));
        }
        if !self.overwrite && self.output.exists() {
            return Err(ExportError::OutputExists(self.output.clone()));
        }
        Ok(())
    }
}
