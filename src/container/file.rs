//! Raw container files on the local filesystem.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::header::{ContainerHeader, FIXED_HEADER_SIZE};
use super::{ContainerDescriptor, ContainerFormat, ContainerReader, ContainerWriter};
use crate::error::ContainerError;
use crate::region::Rect;
use crate::source::PixelKind;

/// Write buffer size for container files.
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

// =============================================================================
// RawContainerFormat
// =============================================================================

/// The "PYRM" raw tiled container.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawContainerFormat;

impl ContainerFormat for RawContainerFormat {
    type Writer = RawContainerWriter;
    type Reader = RawContainerReader;

    fn create(
        &self,
        path: &Path,
        descriptor: &ContainerDescriptor,
    ) -> Result<RawContainerWriter, ContainerError> {
        RawContainerWriter::create(path, *descriptor)
    }

    fn open(&self, path: &Path) -> Result<RawContainerReader, ContainerError> {
        RawContainerReader::open(path)
    }
}

// =============================================================================
// RawContainerWriter
// =============================================================================

/// Writer for a raw container.
///
/// Levels are collected by `declare_level` until the first tile is written,
/// at which point the layout is fixed and the header is emitted. Tiles that
/// arrive in layout order are appended without seeking.
#[derive(Debug)]
pub struct RawContainerWriter {
    path: PathBuf,
    descriptor: ContainerDescriptor,
    file: Option<BufWriter<File>>,
    sizes: Vec<(u32, u32)>,
    header: Option<ContainerHeader>,
    position: u64,
}

impl RawContainerWriter {
    pub fn create(path: &Path, descriptor: ContainerDescriptor) -> Result<Self, ContainerError> {
        if descriptor.tile_width == 0 || descriptor.tile_height == 0 {
            return Err(ContainerError::InvalidTileSize {
                width: descriptor.tile_width,
                height: descriptor.tile_height,
            });
        }

        let file = File::create(path)?;
        debug!(path = %path.display(), kind = %descriptor.pixel_kind, "Created container");

        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            file: Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file)),
            sizes: Vec::new(),
            header: None,
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fix the layout and write the header.
    fn seal(&mut self) -> Result<(), ContainerError> {
        if self.header.is_some() {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(ContainerError::Closed)?;
        let header = ContainerHeader::layout(&self.descriptor, &self.sizes);
        let encoded = header.encode();

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        self.position = encoded.len() as u64;
        self.header = Some(header);
        Ok(())
    }
}

impl ContainerWriter for RawContainerWriter {
    fn declare_level(
        &mut self,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<(), ContainerError> {
        if self.file.is_none() {
            return Err(ContainerError::Closed);
        }
        if self.header.is_some() {
            return Err(ContainerError::LayoutSealed(level));
        }
        if level != self.sizes.len() {
            return Err(ContainerError::LevelOrder {
                expected: self.sizes.len(),
                got: level,
            });
        }
        self.sizes.push((width, height));
        Ok(())
    }

    fn write_tile(
        &mut self,
        level: usize,
        plane: usize,
        rect: Rect,
        data: &[u8],
    ) -> Result<(), ContainerError> {
        self.seal()?;
        let header = self.header.as_ref().ok_or(ContainerError::Closed)?;

        if level >= header.levels.len() {
            return Err(ContainerError::LevelOutOfRange {
                level,
                count: header.levels.len(),
            });
        }
        if plane >= header.plane_count as usize {
            return Err(ContainerError::PlaneOutOfRange {
                plane,
                count: header.plane_count as usize,
            });
        }

        let not_a_tile = || ContainerError::NotATile {
            level,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        };
        if rect.x % header.tile_width != 0 || rect.y % header.tile_height != 0 {
            return Err(not_a_tile());
        }
        let (row, col) = (rect.y / header.tile_height, rect.x / header.tile_width);
        if header.tile_rect(level, row, col) != Some(rect) {
            return Err(not_a_tile());
        }

        let expected = rect.area() as usize * header.pixel_kind.bytes_per_pixel();
        if data.len() != expected {
            return Err(ContainerError::TileSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let offset = header.tile_offset(level, plane, row, col);
        let file = self.file.as_mut().ok_or(ContainerError::Closed)?;
        if offset != self.position {
            file.seek(SeekFrom::Start(offset))?;
        }
        file.write_all(data)?;
        self.position = offset + data.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ContainerError> {
        if self.file.is_none() {
            return Ok(());
        }
        self.seal()?;

        let Some(writer) = self.file.take() else {
            return Ok(());
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if let Some(header) = &self.header {
            file.set_len(header.file_len())?;
        }
        debug!(path = %self.path.display(), "Closed container");
        Ok(())
    }
}

// =============================================================================
// RawContainerReader
// =============================================================================

/// Reader for a raw container.
#[derive(Debug)]
pub struct RawContainerReader {
    file: File,
    header: ContainerHeader,
    tile_buf: Vec<u8>,
}

impl RawContainerReader {
    /// Open a container and validate its header against the file length.
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let mut file = File::open(path)?;
        let actual = file.metadata()?.len();

        let mut fixed = [0u8; FIXED_HEADER_SIZE];
        if actual < FIXED_HEADER_SIZE as u64 {
            return Err(ContainerError::FileTooSmall {
                required: FIXED_HEADER_SIZE as u64,
                actual,
            });
        }
        file.read_exact(&mut fixed)?;

        let level_count = ContainerHeader::peek_level_count(&fixed)?;
        let header_len = ContainerHeader::encoded_len(level_count) as u64;
        if actual < header_len {
            return Err(ContainerError::FileTooSmall {
                required: header_len,
                actual,
            });
        }

        let mut bytes = vec![0u8; header_len as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes)?;
        let header = ContainerHeader::parse(&bytes)?;

        let required = header.file_len();
        if actual < required {
            return Err(ContainerError::FileTooSmall { required, actual });
        }

        Ok(Self {
            file,
            header,
            tile_buf: Vec::new(),
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }
}

impl ContainerReader for RawContainerReader {
    fn pixel_kind(&self) -> PixelKind {
        self.header.pixel_kind
    }

    fn plane_count(&self) -> usize {
        self.header.plane_count as usize
    }

    fn level_count(&self) -> usize {
        self.header.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.header
            .levels
            .get(level)
            .map(|entry| (entry.width, entry.height))
    }

    fn read_region(
        &mut self,
        level: usize,
        plane: usize,
        rect: Rect,
    ) -> Result<Vec<u8>, ContainerError> {
        let header = &self.header;
        let entry = header
            .levels
            .get(level)
            .ok_or(ContainerError::LevelOutOfRange {
                level,
                count: header.levels.len(),
            })?;
        if plane >= header.plane_count as usize {
            return Err(ContainerError::PlaneOutOfRange {
                plane,
                count: header.plane_count as usize,
            });
        }
        if !rect.fits_within(entry.width, entry.height) {
            return Err(ContainerError::RegionOutOfBounds {
                level,
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }

        let bpp = header.pixel_kind.bytes_per_pixel();
        let out_stride = rect.width as usize * bpp;
        let mut out = vec![0u8; out_stride * rect.height as usize];
        if rect.is_empty() {
            return Ok(out);
        }

        let first_row = rect.y / header.tile_height;
        let last_row = (rect.bottom() as u32 - 1) / header.tile_height;
        let first_col = rect.x / header.tile_width;
        let last_col = (rect.right() as u32 - 1) / header.tile_width;

        for row in first_row..=last_row {
            for col in first_col..=last_col {
                let Some(tile) = header.tile_rect(level, row, col) else {
                    continue;
                };
                let Some(overlap) = tile.intersect(&rect) else {
                    continue;
                };

                let tile_stride = tile.width as usize * bpp;
                self.tile_buf.resize(tile_stride * tile.height as usize, 0);
                self.file
                    .seek(SeekFrom::Start(header.tile_offset(level, plane, row, col)))?;
                self.file.read_exact(&mut self.tile_buf)?;

                let span = overlap.width as usize * bpp;
                for y in overlap.y..overlap.y + overlap.height {
                    let src = (y - tile.y) as usize * tile_stride + (overlap.x - tile.x) as usize * bpp;
                    let dst = (y - rect.y) as usize * out_stride + (overlap.x - rect.x) as usize * bpp;
                    out[dst..dst + span].copy_from_slice(&self.tile_buf[src..src + span]);
                }
            }
        }

        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
