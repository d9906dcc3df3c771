//! Pixel types and in-memory pixel planes.

use std::fmt;

use image::{GrayImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use serde::Serialize;

use crate::error::{EncodeError, SourceError};

/// 16-bit grayscale plane.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// 32-bit float grayscale plane.
pub type Gray32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

// =============================================================================
// PixelType
// =============================================================================

/// Pixel type reported by an image source.
///
/// Sources may report any of these; only the subset that maps to a
/// [`PixelKind`] can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    /// Packed 8-bit RGB
    Rgb8,
    /// Packed 8-bit RGBA
    Rgba8,
}

impl PixelType {
    /// Bytes occupied by one pixel in a raw interleaved buffer.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float32 => 4,
            PixelType::Float64 => 8,
            PixelType::Rgb8 => 3,
            PixelType::Rgba8 => 4,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
            PixelType::Rgb8 => "rgb8",
            PixelType::Rgba8 => "rgba8",
        };
        f.write_str(name)
    }
}

// =============================================================================
// PixelKind
// =============================================================================

/// Pixel kinds that can be written to a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelKind {
    Uint8,
    /// Big-endian on output
    Uint16,
    /// Big-endian IEEE-754 on output
    Float32,
    /// Three interleaved 8-bit channels; alpha is dropped
    Rgb8,
}

impl PixelKind {
    /// Bytes per channel sample.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PixelKind::Uint8 | PixelKind::Rgb8 => 1,
            PixelKind::Uint16 => 2,
            PixelKind::Float32 => 4,
        }
    }

    /// Interleaved samples per pixel.
    pub const fn samples_per_pixel(self) -> usize {
        match self {
            PixelKind::Rgb8 => 3,
            _ => 1,
        }
    }

    /// Encoded bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        self.bytes_per_sample() * self.samples_per_pixel()
    }

    /// Numeric code stored in container headers.
    pub const fn code(self) -> u8 {
        match self {
            PixelKind::Uint8 => 1,
            PixelKind::Uint16 => 2,
            PixelKind::Float32 => 3,
            PixelKind::Rgb8 => 4,
        }
    }

    /// Inverse of [`PixelKind::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PixelKind::Uint8),
            2 => Some(PixelKind::Uint16),
            3 => Some(PixelKind::Float32),
            4 => Some(PixelKind::Rgb8),
            _ => None,
        }
    }
}

impl TryFrom<PixelType> for PixelKind {
    type Error = EncodeError;

    fn try_from(pixel_type: PixelType) -> Result<Self, Self::Error> {
        match pixel_type {
            PixelType::Uint8 => Ok(PixelKind::Uint8),
            PixelType::Uint16 => Ok(PixelKind::Uint16),
            PixelType::Float32 => Ok(PixelKind::Float32),
            PixelType::Rgb8 | PixelType::Rgba8 => Ok(PixelKind::Rgb8),
            other => Err(EncodeError::UnsupportedPixelType(other)),
        }
    }
}

impl fmt::Display for PixelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelKind::Uint8 => "uint8",
            PixelKind::Uint16 => "uint16",
            PixelKind::Float32 => "float32",
            PixelKind::Rgb8 => "rgb8",
        };
        f.write_str(name)
    }
}

// =============================================================================
// PixelPlane
// =============================================================================

/// A typed, in-memory rectangle of pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelPlane {
    Gray8(GrayImage),
    Gray16(Gray16Image),
    Gray32F(Gray32FImage),
    Rgb8(RgbImage),
    Rgba8(RgbaImage),
}

impl PixelPlane {
    pub fn width(&self) -> u32 {
        match self {
            PixelPlane::Gray8(img) => img.width(),
            PixelPlane::Gray16(img) => img.width(),
            PixelPlane::Gray32F(img) => img.width(),
            PixelPlane::Rgb8(img) => img.width(),
            PixelPlane::Rgba8(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            PixelPlane::Gray8(img) => img.height(),
            PixelPlane::Gray16(img) => img.height(),
            PixelPlane::Gray32F(img) => img.height(),
            PixelPlane::Rgb8(img) => img.height(),
            PixelPlane::Rgba8(img) => img.height(),
        }
    }

    /// Pixel kind this plane encodes to.
    pub fn kind(&self) -> PixelKind {
        match self {
            PixelPlane::Gray8(_) => PixelKind::Uint8,
            PixelPlane::Gray16(_) => PixelKind::Uint16,
            PixelPlane::Gray32F(_) => PixelKind::Float32,
            PixelPlane::Rgb8(_) | PixelPlane::Rgba8(_) => PixelKind::Rgb8,
        }
    }

    /// Build a plane from a raw interleaved buffer.
    ///
    /// Multi-byte samples are read with the given endianness.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if `data` does not hold exactly
    /// `width * height` pixels, and `UnsupportedPixelType` for pixel types
    /// without a plane representation.
    pub fn from_raw(
        pixel_type: PixelType,
        width: u32,
        height: u32,
        data: Vec<u8>,
        little_endian: bool,
    ) -> Result<Self, SourceError> {
        let expected = width as u64 * height as u64 * pixel_type.bytes_per_pixel() as u64;
        if data.len() as u64 != expected {
            return Err(SourceError::SizeMismatch {
                expected,
                actual: data.len() as u64,
            });
        }

        // Length was checked above, so the buffers below always fit.
        let plane = match pixel_type {
            PixelType::Uint8 => GrayImage::from_raw(width, height, data).map(PixelPlane::Gray8),
            PixelType::Uint16 => {
                let samples = data
                    .chunks_exact(2)
                    .map(|b| {
                        let b = [b[0], b[1]];
                        if little_endian {
                            u16::from_le_bytes(b)
                        } else {
                            u16::from_be_bytes(b)
                        }
                    })
                    .collect();
                Gray16Image::from_raw(width, height, samples).map(PixelPlane::Gray16)
            }
            PixelType::Float32 => {
                let samples = data
                    .chunks_exact(4)
                    .map(|b| {
                        let b = [b[0], b[1], b[2], b[3]];
                        if little_endian {
                            f32::from_le_bytes(b)
                        } else {
                            f32::from_be_bytes(b)
                        }
                    })
                    .collect();
                Gray32FImage::from_raw(width, height, samples).map(PixelPlane::Gray32F)
            }
            PixelType::Rgb8 => RgbImage::from_raw(width, height, data).map(PixelPlane::Rgb8),
            PixelType::Rgba8 => RgbaImage::from_raw(width, height, data).map(PixelPlane::Rgba8),
            other => return Err(SourceError::UnsupportedPixelType(other)),
        };

        plane.ok_or(SourceError::SizeMismatch {
            expected,
            actual: expected,
        })
    }
}
