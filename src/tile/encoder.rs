//! Raw tile encoder.
//!
//! Converts a rectangle of a decoded plane into the byte layout stored in the
//! container:
//!
//! - **uint8**: one byte per pixel
//! - **uint16**: two bytes per pixel, big-endian
//! - **float32**: four bytes per pixel, big-endian IEEE-754
//! - **rgb8**: R, G, B interleaved; an alpha channel is dropped
//!
//! Rows are emitted top to bottom with no padding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;
use crate::region::Rect;
use crate::source::{PixelKind, PixelPlane};

// =============================================================================
// Pixel Encoder
// =============================================================================

/// Encoder turning plane regions into raw tile bytes.
///
/// # Example
///
/// ```
/// use image::{GrayImage, Luma};
/// use pyramid_export::region::Rect;
/// use pyramid_export::source::{PixelKind, PixelPlane};
/// use pyramid_export::tile::PixelEncoder;
///
/// let plane = PixelPlane::Gray8(GrayImage::from_pixel(4, 4, Luma([7])));
/// let bytes = PixelEncoder::new()
///     .encode(&plane, Rect::new(1, 1, 2, 2), PixelKind::Uint8)
///     .unwrap();
/// assert_eq!(&bytes[..], &[7, 7, 7, 7]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PixelEncoder {}

impl PixelEncoder {
    /// Create a new pixel encoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `rect` of `plane` as `kind`.
    ///
    /// # Errors
    ///
    /// - `KindMismatch` if the plane does not hold `kind` pixels
    /// - `RegionOutOfBounds` if `rect` is not inside the plane
    /// - `RegionTooLarge` if the result would exceed `i32::MAX` bytes
    pub fn encode(
        &self,
        plane: &PixelPlane,
        rect: Rect,
        kind: PixelKind,
    ) -> Result<Bytes, EncodeError> {
        if plane.kind() != kind {
            return Err(EncodeError::KindMismatch {
                expected: kind.to_string(),
                actual: plane.kind().to_string(),
            });
        }

        if !rect.fits_within(plane.width(), plane.height()) {
            return Err(EncodeError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                plane_width: plane.width(),
                plane_height: plane.height(),
            });
        }

        let len = match rect.byte_len(kind.bytes_per_pixel()) {
            Some(len) if len <= i32::MAX as usize => len,
            _ => {
                return Err(EncodeError::RegionTooLarge {
                    width: rect.width,
                    height: rect.height,
                    bytes_per_pixel: kind.bytes_per_pixel(),
                })
            }
        };

        let mut out = BytesMut::with_capacity(len);
        let stride = plane.width() as usize;
        let (x0, x1) = (rect.x as usize, rect.x as usize + rect.width as usize);

        for y in rect.y as usize..rect.y as usize + rect.height as usize {
            let row = y * stride;
            match plane {
                PixelPlane::Gray8(img) => out.put_slice(&img.as_raw()[row + x0..row + x1]),
                PixelPlane::Gray16(img) => {
                    for &v in &img.as_raw()[row + x0..row + x1] {
                        out.put_u16(v);
                    }
                }
                PixelPlane::Gray32F(img) => {
                    for &v in &img.as_raw()[row + x0..row + x1] {
                        out.put_f32(v);
                    }
                }
                PixelPlane::Rgb8(img) => out.put_slice(&img.as_raw()[(row + x0) * 3..(row + x1) * 3]),
                PixelPlane::Rgba8(img) => {
                    for px in img.as_raw()[(row + x0) * 4..(row + x1) * 4].chunks_exact(4) {
                        out.put_slice(&px[..3]);
                    }
                }
            }
        }

        debug_assert_eq!(out.len(), len);
        Ok(out.freeze())
    }
}

// =============================================================================
// Tests
// =============================================================================
