use image::imageops;

use super::{check_region, ImageDimensions, ImageSource, PixelPlane, PixelType, PlaneSelector};
use crate::error::SourceError;
use crate::region::Rect;

/// An image source backed by planes held in memory.
///
/// Planes are stored with z varying fastest, then channel, then time, so the
/// plane for `(c, z, t)` lives at `(t * size_c + c) * size_z + z`.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    dimensions: ImageDimensions,
    pixel_type: PixelType,
    planes: Vec<PixelPlane>,
}

impl InMemorySource {
    /// Create a source from planes in `(t, c, z)` order.
    ///
    /// # Errors
    ///
    /// Fails if the plane count does not match the axis sizes, or if planes
    /// differ in size or pixel layout.
    pub fn new(
        planes: Vec<PixelPlane>,
        size_c: u32,
        size_z: u32,
        size_t: u32,
    ) -> Result<Self, SourceError> {
        let expected = size_c as u64 * size_z as u64 * size_t as u64;
        let first = match planes.first() {
            Some(first) if planes.len() as u64 == expected => first,
            _ => {
                return Err(SourceError::SizeMismatch {
                    expected,
                    actual: planes.len() as u64,
                })
            }
        };

        let (size_x, size_y) = (first.width(), first.height());
        let pixel_type = plane_pixel_type(first);
        for plane in &planes {
            if plane.width() != size_x
                || plane.height() != size_y
                || plane_pixel_type(plane) != pixel_type
            {
                return Err(SourceError::SizeMismatch {
                    expected: size_x as u64 * size_y as u64,
                    actual: plane.width() as u64 * plane.height() as u64,
                });
            }
        }

        Ok(Self {
            dimensions: ImageDimensions {
                size_x,
                size_y,
                size_c,
                size_z,
                size_t,
            },
            pixel_type,
            planes,
        })
    }

    /// A source holding a single plane.
    pub fn single(plane: PixelPlane) -> Self {
        let dimensions = ImageDimensions {
            size_x: plane.width(),
            size_y: plane.height(),
            size_c: 1,
            size_z: 1,
            size_t: 1,
        };
        Self {
            dimensions,
            pixel_type: plane_pixel_type(&plane),
            planes: vec![plane],
        }
    }

    fn plane_index(&self, plane: PlaneSelector) -> usize {
        let d = &self.dimensions;
        ((plane.t as usize * d.size_c as usize) + plane.c as usize) * d.size_z as usize
            + plane.z as usize
    }
}

fn plane_pixel_type(plane: &PixelPlane) -> PixelType {
    match plane {
        PixelPlane::Gray8(_) => PixelType::Uint8,
        PixelPlane::Gray16(_) => PixelType::Uint16,
        PixelPlane::Gray32F(_) => PixelType::Float32,
        PixelPlane::Rgb8(_) => PixelType::Rgb8,
        PixelPlane::Rgba8(_) => PixelType::Rgba8,
    }
}

impl ImageSource for InMemorySource {
    fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn read_region(&self, plane: PlaneSelector, rect: Rect) -> Result<PixelPlane, SourceError> {
        check_region(&self.dimensions, plane, rect)?;

        let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
        let region = match &self.planes[self.plane_index(plane)] {
            PixelPlane::Gray8(img) => PixelPlane::Gray8(imageops::crop_imm(img, x, y, w, h).to_image()),
            PixelPlane::Gray16(img) => {
                PixelPlane::Gray16(imageops::crop_imm(img, x, y, w, h).to_image())
            }
            PixelPlane::Gray32F(img) => {
                PixelPlane::Gray32F(imageops::crop_imm(img, x, y, w, h).to_image())
            }
            PixelPlane::Rgb8(img) => PixelPlane::Rgb8(imageops::crop_imm(img, x, y, w, h).to_image()),
            PixelPlane::Rgba8(img) => {
                PixelPlane::Rgba8(imageops::crop_imm(img, x, y, w, h).to_image())
            }
        };
        Ok(region)
    }
}
