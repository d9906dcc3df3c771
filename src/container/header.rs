//! Raw container header and layout.
//!
//! # Header Structure
//!
//! All integers are big-endian.
//!
//! ```text
//! Bytes 0-3:   Magic "PYRM"
//! Bytes 4-5:   Format version (1)
//! Byte  6:     Pixel kind code (1=uint8, 2=uint16, 3=float32, 4=rgb8)
//! Byte  7:     Reserved (0)
//! Bytes 8-11:  Plane count
//! Bytes 12-15: Level count (L)
//! Bytes 16-19: Tile width
//! Bytes 20-23: Tile height
//! Bytes 24-:   L level entries of 16 bytes: width u32, height u32, data offset u64
//! ```
//!
//! # Level Data
//!
//! Planes follow each other in index order. Inside a plane, tile rows run top
//! to bottom and tiles left to right; each tile is stored row-major at its
//! clipped size. A tile's offset therefore has a closed form:
//!
//! ```text
//! plane_base + row * tile_height * width * bpp + col * tile_width * band_height * bpp
//! ```
//!
//! where `band_height` is the clipped height of that tile row.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::ContainerError;
use crate::region::Rect;
use crate::source::PixelKind;

use super::ContainerDescriptor;

// =============================================================================
// Constants
// =============================================================================

/// File magic.
pub const MAGIC: [u8; 4] = *b"PYRM";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed part of the header.
pub const FIXED_HEADER_SIZE: usize = 24;

/// Size of one level entry.
pub const LEVEL_ENTRY_SIZE: usize = 16;

// =============================================================================
// ContainerHeader
// =============================================================================

/// One level entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelEntry {
    pub width: u32,
    pub height: u32,
    /// Absolute file offset of the level's first byte
    pub data_offset: u64,
}

/// Parsed or to-be-written container header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub pixel_kind: PixelKind,
    pub plane_count: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub levels: Vec<LevelEntry>,
}

impl ContainerHeader {
    /// Lay out levels of the given sizes back to back after the header.
    pub fn layout(descriptor: &ContainerDescriptor, sizes: &[(u32, u32)]) -> Self {
        let mut header = Self {
            pixel_kind: descriptor.pixel_kind,
            plane_count: descriptor.plane_count,
            tile_width: descriptor.tile_width,
            tile_height: descriptor.tile_height,
            levels: Vec::with_capacity(sizes.len()),
        };

        let mut offset = Self::encoded_len(sizes.len()) as u64;
        for &(width, height) in sizes {
            header.levels.push(LevelEntry {
                width,
                height,
                data_offset: offset,
            });
            offset += header.level_bytes(width, height);
        }
        header
    }

    /// Header size for `level_count` levels.
    pub fn encoded_len(level_count: usize) -> usize {
        FIXED_HEADER_SIZE + level_count * LEVEL_ENTRY_SIZE
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::encoded_len(self.levels.len()));
        buf.put_slice(&MAGIC);
        buf.put_u16(FORMAT_VERSION);
        buf.put_u8(self.pixel_kind.code());
        buf.put_u8(0);
        buf.put_u32(self.plane_count);
        buf.put_u32(self.levels.len() as u32);
        buf.put_u32(self.tile_width);
        buf.put_u32(self.tile_height);
        for level in &self.levels {
            buf.put_u32(level.width);
            buf.put_u32(level.height);
            buf.put_u64(level.data_offset);
        }
        buf.freeze()
    }

    /// Level count declared by the fixed part of a header.
    ///
    /// Used to find out how many bytes [`ContainerHeader::parse`] needs.
    pub fn peek_level_count(bytes: &[u8]) -> Result<usize, ContainerError> {
        Self::check_fixed(bytes)?;
        let mut buf = &bytes[12..16];
        Ok(buf.get_u32() as usize)
    }

    /// Parse a complete header.
    ///
    /// # Errors
    ///
    /// - `FileTooSmall` if `bytes` is shorter than the declared header
    /// - `InvalidMagic`, `UnsupportedVersion` or `UnknownPixelKind` for
    ///   foreign or corrupt files
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        Self::check_fixed(bytes)?;

        let mut buf = &bytes[6..];
        let code = buf.get_u8();
        let pixel_kind = PixelKind::from_code(code).ok_or(ContainerError::UnknownPixelKind(code))?;
        buf.advance(1);
        let plane_count = buf.get_u32();
        let level_count = buf.get_u32() as usize;
        let tile_width = buf.get_u32();
        let tile_height = buf.get_u32();
        if tile_width == 0 || tile_height == 0 {
            return Err(ContainerError::InvalidTileSize {
                width: tile_width,
                height: tile_height,
            });
        }

        let required = Self::encoded_len(level_count);
        if bytes.len() < required {
            return Err(ContainerError::FileTooSmall {
                required: required as u64,
                actual: bytes.len() as u64,
            });
        }

        let levels = (0..level_count)
            .map(|_| LevelEntry {
                width: buf.get_u32(),
                height: buf.get_u32(),
                data_offset: buf.get_u64(),
            })
            .collect();

        Ok(Self {
            pixel_kind,
            plane_count,
            tile_width,
            tile_height,
            levels,
        })
    }

    fn check_fixed(bytes: &[u8]) -> Result<(), ContainerError> {
        if bytes.len() < FIXED_HEADER_SIZE {
            return Err(ContainerError::FileTooSmall {
                required: FIXED_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(ContainerError::InvalidMagic(magic));
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        Ok(())
    }

    #[inline]
    fn bpp(&self) -> u64 {
        self.pixel_kind.bytes_per_pixel() as u64
    }

    /// Bytes of one level over every plane.
    pub fn level_bytes(&self, width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * self.bpp() * self.plane_count as u64
    }

    /// Total file length implied by the header.
    pub fn file_len(&self) -> u64 {
        self.levels
            .last()
            .map(|last| last.data_offset + self.level_bytes(last.width, last.height))
            .unwrap_or(Self::encoded_len(0) as u64)
    }

    pub fn tiles_x(&self, level: usize) -> u32 {
        self.levels
            .get(level)
            .map_or(0, |entry| entry.width.div_ceil(self.tile_width.max(1)))
    }

    pub fn tiles_y(&self, level: usize) -> u32 {
        self.levels
            .get(level)
            .map_or(0, |entry| entry.height.div_ceil(self.tile_height.max(1)))
    }

    /// Clipped rectangle of a tile, if it exists.
    pub fn tile_rect(&self, level: usize, row: u32, col: u32) -> Option<Rect> {
        let entry = self.levels.get(level)?;
        if row >= self.tiles_y(level) || col >= self.tiles_x(level) {
            return None;
        }
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        Some(Rect::new(
            x,
            y,
            self.tile_width.min(entry.width - x),
            self.tile_height.min(entry.height - y),
        ))
    }

    /// File offset of a tile's first byte.
    ///
    /// The caller guarantees that level, plane and tile exist.
    pub fn tile_offset(&self, level: usize, plane: usize, row: u32, col: u32) -> u64 {
        let entry = &self.levels[level];
        let bpp = self.bpp();
        let plane_bytes = entry.width as u64 * entry.height as u64 * bpp;
        let band_height = self
            .tile_height
            .min(entry.height - row * self.tile_height) as u64;

        entry.data_offset
            + plane as u64 * plane_bytes
            + row as u64 * self.tile_height as u64 * entry.width as u64 * bpp
            + col as u64 * self.tile_width as u64 * band_height * bpp
    }
}

// =============================================================================
// Tests
// =============================================================================
