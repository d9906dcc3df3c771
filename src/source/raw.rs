//! Raw planar stacks on disk.
//!
//! A raw stack is a headerless file holding every plane back to back in XYZCT
//! order (x fastest, then y, z, channel, time). Pixels are interleaved for
//! packed colour types.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{check_region, ImageDimensions, ImageSource, PixelPlane, PixelType, PlaneSelector};
use crate::error::SourceError;
use crate::region::Rect;

/// Geometry and encoding of a raw stack file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStackLayout {
    pub dimensions: ImageDimensions,
    pub pixel_type: PixelType,
    /// Byte order of multi-byte samples
    pub little_endian: bool,
}

impl RawStackLayout {
    /// Bytes in one plane.
    pub fn plane_bytes(&self) -> u64 {
        self.dimensions.size_x as u64
            * self.dimensions.size_y as u64
            * self.pixel_type.bytes_per_pixel() as u64
    }

    /// Expected file length.
    pub fn file_bytes(&self) -> u64 {
        self.plane_bytes() * self.dimensions.plane_count()
    }

    /// Byte offset of a plane's first pixel.
    pub fn plane_offset(&self, plane: PlaneSelector) -> u64 {
        let d = &self.dimensions;
        let index = (plane.t as u64 * d.size_c as u64 + plane.c as u64) * d.size_z as u64
            + plane.z as u64;
        index * self.plane_bytes()
    }
}

/// An [`ImageSource`] reading regions from a raw stack file.
///
/// Only the rows of the requested region are read. Reads are positional, so
/// workers share one file handle without serializing on it.
pub struct RawStackSource {
    path: PathBuf,
    layout: RawStackLayout,
    file: File,
}

impl RawStackSource {
    /// Open a raw stack and check its length against the layout.
    pub fn open(path: impl AsRef<Path>, layout: RawStackLayout) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let actual = file.metadata()?.len();
        let expected = layout.file_bytes();
        if actual != expected {
            return Err(SourceError::SizeMismatch { expected, actual });
        }

        debug!(
            path = %path.display(),
            planes = layout.dimensions.plane_count(),
            "Opened raw stack"
        );

        Ok(Self {
            path,
            layout,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &RawStackLayout {
        &self.layout
    }
}

impl ImageSource for RawStackSource {
    fn dimensions(&self) -> ImageDimensions {
        self.layout.dimensions
    }

    fn pixel_type(&self) -> PixelType {
        self.layout.pixel_type
    }

    fn read_region(&self, plane: PlaneSelector, rect: Rect) -> Result<PixelPlane, SourceError> {
        check_region(&self.layout.dimensions, plane, rect)?;

        let bpp = self.layout.pixel_type.bytes_per_pixel();
        let row_len = rect.width as usize * bpp;
        let stride = self.layout.dimensions.size_x as u64 * bpp as u64;
        let base = self.layout.plane_offset(plane) + rect.x as u64 * bpp as u64;

        let mut data = vec![0u8; row_len * rect.height as usize];
        for (row, chunk) in data.chunks_exact_mut(row_len.max(1)).enumerate() {
            let offset = base + (rect.y as u64 + row as u64) * stride;
            read_exact_at(&self.file, chunk, offset)?;
        }

        PixelPlane::from_raw(
            self.layout.pixel_type,
            rect.width,
            rect.height,
            data,
            self.layout.little_endian,
        )
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
