//! Image source abstraction.
//!
//! The exporter never decodes files itself. It pulls rectangular regions of
//! single planes through the [`ImageSource`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            PyramidExporter              │
//! │     (level 0 tiles, many threads)       │
//! └────────────────────┬────────────────────┘
//!                      │ read_region(c, z, t, rect)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ImageSource Trait             │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ InMemorySource  │    │  RawStackSource     │
//! │ (PixelPlanes)   │    │  (raw file on disk) │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod memory;
mod pixel;
mod raw;

pub use memory::InMemorySource;
pub use pixel::{Gray16Image, Gray32FImage, PixelKind, PixelPlane, PixelType};
pub use raw::{RawStackLayout, RawStackSource};

use serde::Serialize;

use crate::error::SourceError;
use crate::region::Rect;

/// Axis sizes of a five-dimensional image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub size_x: u32,
    pub size_y: u32,
    pub size_c: u32,
    pub size_z: u32,
    pub size_t: u32,
}

impl ImageDimensions {
    /// Total number of planes.
    pub fn plane_count(&self) -> u64 {
        self.size_c as u64 * self.size_z as u64 * self.size_t as u64
    }

    /// Whether a plane selector addresses an existing plane.
    pub fn contains(&self, plane: PlaneSelector) -> bool {
        plane.c < self.size_c && plane.z < self.size_z && plane.t < self.size_t
    }
}

/// Source-space indices of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneSelector {
    pub c: u32,
    pub z: u32,
    pub t: u32,
}

impl PlaneSelector {
    pub const fn new(c: u32, z: u32, t: u32) -> Self {
        Self { c, z, t }
    }
}

/// Read-only random access to the pixels of a multi-dimensional image.
///
/// Implementations are shared by every export worker, so reads must be safe
/// to issue concurrently.
pub trait ImageSource: Send + Sync {
    /// Axis sizes.
    fn dimensions(&self) -> ImageDimensions;

    /// Pixel type of every plane.
    fn pixel_type(&self) -> PixelType;

    /// Read the pixels of `rect` from one plane.
    ///
    /// The returned plane is exactly `rect.width` x `rect.height`.
    fn read_region(&self, plane: PlaneSelector, rect: Rect) -> Result<PixelPlane, SourceError>;
}

/// Check a region request against the source dimensions.
pub(crate) fn check_region(
    dimensions: &ImageDimensions,
    plane: PlaneSelector,
    rect: Rect,
) -> Result<(), SourceError> {
    if !dimensions.contains(plane) {
        return Err(SourceError::PlaneOutOfRange {
            c: plane.c,
            z: plane.z,
            t: plane.t,
        });
    }
    if !rect.fits_within(dimensions.size_x, dimensions.size_y) {
        return Err(SourceError::RegionOutOfBounds {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            size_x: dimensions.size_x,
            size_y: dimensions.size_y,
        });
    }
    Ok(())
}
