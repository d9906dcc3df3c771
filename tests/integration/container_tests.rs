//! Raw container tests through the public API.

use std::fs::{self, OpenOptions};

use tempfile::TempDir;

use pyramid_export::container::{
    ContainerDescriptor, ContainerFormat, ContainerHeader, ContainerReader, ContainerWriter,
    RawContainerFormat, RawContainerReader, FIXED_HEADER_SIZE, LEVEL_ENTRY_SIZE,
};
use pyramid_export::error::ContainerError;
use pyramid_export::region::Rect;
use pyramid_export::source::PixelKind;
use pyramid_export::{export, ExportOptions};

use super::test_utils::{pattern_source, pattern_value};

fn descriptor(kind: PixelKind, planes: u32) -> ContainerDescriptor {
    ContainerDescriptor {
        pixel_kind: kind,
        plane_count: planes,
        tile_width: 8,
        tile_height: 4,
    }
}

#[test]
fn test_regions_span_tile_boundaries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grid.pyrm");
    let (width, height) = (20u32, 10u32);

    let mut writer = RawContainerFormat
        .create(&path, &descriptor(PixelKind::Uint8, 2))
        .unwrap();
    writer.declare_level(0, width, height).unwrap();
    for plane in 0..2u32 {
        for row in 0..3u32 {
            for col in 0..3u32 {
                let rect = Rect::new(
                    col * 8,
                    row * 4,
                    8.min(width - col * 8),
                    4.min(height - row * 4),
                );
                let data: Vec<u8> = (rect.y..rect.y + rect.height)
                    .flat_map(|y| (rect.x..rect.x + rect.width).map(move |x| pattern_value(x, y, plane)))
                    .collect();
                writer.write_tile(0, plane as usize, rect, &data).unwrap();
            }
        }
    }
    writer.close().unwrap();

    let mut reader = RawContainerFormat.open(&path).unwrap();
    let region = Rect::new(5, 3, 11, 6);
    let data = reader.read_region(0, 1, region).unwrap();
    let expected: Vec<u8> = (3..9)
        .flat_map(|y| (5..16).map(move |x| pattern_value(x, y, 1)))
        .collect();
    assert_eq!(data, expected);
}

#[test]
fn test_exported_header_matches_summary() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");
    let opts = ExportOptions::new(&output)
        .with_tile_size(24, 16)
        .with_resolution_levels(3)
        .with_threads(2);
    let summary = export(&pattern_source(70, 50, 2, 1, 1), opts).unwrap();

    let reader = RawContainerReader::open(&output).unwrap();
    let header = reader.header();
    assert_eq!(header.pixel_kind, PixelKind::Uint8);
    assert_eq!(header.plane_count, 2);
    assert_eq!((header.tile_width, header.tile_height), (24, 16));
    for (entry, level) in header.levels.iter().zip(&summary.levels) {
        assert_eq!((entry.width, entry.height), (level.width, level.height));
        assert_eq!(header.tiles_x(level.level), level.tiles_x);
        assert_eq!(header.tiles_y(level.level), level.tiles_y);
    }

    let file_len = fs::metadata(&output).unwrap().len();
    assert_eq!(file_len, header.file_len());
    assert_eq!(
        header.levels[0].data_offset,
        (FIXED_HEADER_SIZE + 3 * LEVEL_ENTRY_SIZE) as u64
    );
}

#[test]
fn test_header_json() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");
    let opts = ExportOptions::new(&output)
        .with_tile_size(16, 16)
        .with_resolution_levels(2);
    export(&pattern_source(32, 32, 1, 1, 1), opts).unwrap();

    let reader = RawContainerReader::open(&output).unwrap();
    let json = serde_json::to_value(reader.header()).unwrap();
    assert_eq!(json["plane_count"], 1);
    assert_eq!(json["levels"][1]["width"], 16);
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");
    let opts = ExportOptions::new(&output).with_tile_size(16, 16);
    export(&pattern_source(48, 48, 1, 1, 1), opts).unwrap();

    let len = fs::metadata(&output).unwrap().len();
    let file = OpenOptions::new().write(true).open(&output).unwrap();
    file.set_len(len - 1).unwrap();
    drop(file);

    let result = RawContainerReader::open(&output);
    assert!(matches!(result, Err(ContainerError::FileTooSmall { .. })));
}

#[test]
fn test_foreign_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("foreign.pyrm");
    let mut bytes = vec![0u8; 64];
    bytes[..4].copy_from_slice(b"II*\0");
    fs::write(&path, bytes).unwrap();

    let result = RawContainerReader::open(&path);
    assert!(matches!(result, Err(ContainerError::InvalidMagic(_))));
}

#[test]
fn test_header_parse_matches_encode() {
    let header = ContainerHeader::layout(&descriptor(PixelKind::Float32, 3), &[(40, 30), (20, 15)]);
    let parsed = ContainerHeader::parse(&header.encode()).unwrap();
    assert_eq!(parsed, header);
    assert_eq!(parsed.levels[1].data_offset, header.levels[0].data_offset + 40 * 30 * 4 * 3);
}
