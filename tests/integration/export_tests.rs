//! End-to-end export tests.
//!
//! These run complete exports into temporary directories and read the
//! resulting containers back.

use std::fs;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use pyramid_export::container::{ContainerReader, RawContainerReader};
use pyramid_export::region::Rect;
use pyramid_export::source::{
    ImageDimensions, PixelKind, PixelType, RawStackLayout, RawStackSource,
};
use pyramid_export::{export, ExportError, ExportOptions, ExportProgress, PyramidExporter};

use super::test_utils::{
    dir_entries, gray16_source, gray32f_source, pattern_source, pattern_value, read_level,
    reference_downsample, rgba_source, RecordingFormat,
};

fn options(dir: &TempDir, name: &str) -> ExportOptions {
    ExportOptions::new(dir.path().join(name))
        .with_tile_size(32, 32)
        .with_resolution_levels(3)
        .with_temp_dir(dir.path())
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_export_is_identical_for_any_thread_count() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(100, 70, 2, 2, 1);

    let mut outputs = Vec::new();
    for threads in [0, 1, 4] {
        let name = format!("out-{}.pyrm", threads);
        let opts = options(&dir, &name)
            .with_threads(threads)
            .with_max_tiles_in_queue(3);
        export(&source, opts).unwrap();
        outputs.push(fs::read(dir.path().join(&name)).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn test_tiles_are_written_in_coordinate_order() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(100, 70, 2, 1, 1);
    let format = RecordingFormat::new();
    let output = dir.path().join("out.pyrm");

    let exporter =
        PyramidExporter::with_format(options(&dir, "out.pyrm").with_threads(4), format.clone());
    let summary = exporter.export(&source).unwrap();

    let writes = format.writes_to(&output);
    assert_eq!(writes.len() as u64, summary.tiles_written);
    // 12 + 4 + 1 tiles per plane
    assert_eq!(writes.len(), 34);

    let keys: Vec<_> = writes
        .iter()
        .map(|w| (w.level, w.plane, w.rect.y, w.rect.x))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_scratch_files_hold_only_their_level() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(100, 70, 1, 1, 1);
    let format = RecordingFormat::new();
    let output = dir.path().join("out.pyrm");

    let exporter =
        PyramidExporter::with_format(options(&dir, "out.pyrm").with_threads(2), format.clone());
    exporter.export(&source).unwrap();

    let scratch: Vec<_> = format
        .writes()
        .into_iter()
        .filter(|w| w.path != output)
        .collect();
    // Levels 0 and 1 are staged; the last level never is
    assert_eq!(scratch.len(), 12 + 4);
    assert!(scratch.iter().all(|w| w.level == 0));
    assert!(format.opens() >= 1);

    assert_eq!(dir_entries(dir.path()), vec![output]);
}

// =============================================================================
// Pixel Contents
// =============================================================================

#[test]
fn test_coarser_levels_are_box_averages() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(100, 70, 1, 1, 1);
    let output = dir.path().join("out.pyrm");

    let summary = export(&source, options(&dir, "out.pyrm").with_threads(3)).unwrap();
    let sizes: Vec<_> = summary.levels.iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(sizes, vec![(100, 70), (50, 35), (25, 17)]);

    let mut reader = RawContainerReader::open(&output).unwrap();
    let level0 = read_level(&mut reader, 0, 0);
    let expected0: Vec<u8> = (0..70)
        .flat_map(|y| (0..100).map(move |x| pattern_value(x, y, 0)))
        .collect();
    assert_eq!(level0, expected0);

    let level1 = read_level(&mut reader, 1, 0);
    assert_eq!(level1, reference_downsample(&level0, 100, 70, 2));

    let level2 = read_level(&mut reader, 2, 0);
    assert_eq!(level2, reference_downsample(&level1, 50, 35, 2));
}

#[test]
fn test_downsample_factor_three() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(90, 61, 1, 1, 1);
    let output = dir.path().join("out.pyrm");

    let opts = options(&dir, "out.pyrm")
        .with_downsample(3)
        .with_tile_size(16, 16)
        .with_threads(2);
    export(&source, opts).unwrap();

    let mut reader = RawContainerReader::open(&output).unwrap();
    assert_eq!(reader.level_dimensions(1), Some((30, 20)));
    assert_eq!(reader.level_dimensions(2), Some((10, 6)));

    let level0 = read_level(&mut reader, 0, 0);
    let level1 = read_level(&mut reader, 1, 0);
    assert_eq!(level1, reference_downsample(&level0, 90, 61, 3));
}

#[test]
fn test_subset_planes_follow_t_c_z_order() {
    let dir = TempDir::new().unwrap();
    // 3 channels, 2 z sections, 2 time points
    let source = pattern_source(40, 30, 3, 2, 2);
    let output = dir.path().join("out.pyrm");

    let opts = options(&dir, "out.pyrm")
        .with_resolution_levels(2)
        .with_channels("2,0")
        .with_z("1")
        .with_t("-1")
        .with_threads(2);
    let summary = export(&source, opts).unwrap();
    assert_eq!(summary.plane_count, 2);

    let mut reader = RawContainerReader::open(&output).unwrap();
    assert_eq!(reader.plane_count(), 2);

    // Source planes are stored at (t * C + c) * Z + z
    for (plane, source_plane) in [(0, 11), (1, 7)] {
        let data = read_level(&mut reader, 0, plane);
        let expected: Vec<u8> = (0..30)
            .flat_map(|y| (0..40).map(move |x| pattern_value(x, y, source_plane)))
            .collect();
        assert_eq!(data, expected, "plane {}", plane);
    }
}

#[test]
fn test_export_uint16() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");

    let summary = export(&gray16_source(64, 48), options(&dir, "out.pyrm")).unwrap();
    assert_eq!(summary.pixel_kind, PixelKind::Uint16);

    let mut reader = RawContainerReader::open(&output).unwrap();
    let data = reader.read_region(0, 0, Rect::new(3, 2, 2, 1)).unwrap();
    // Big-endian samples
    assert_eq!(
        data,
        [
            (3000u16 + 14).to_be_bytes(),
            (4000u16 + 14).to_be_bytes()
        ]
        .concat()
    );

    // (0,0) (1,0) (0,1) (1,1) average to 500 + 3 (truncated)
    let level1 = reader.read_region(1, 0, Rect::new(0, 0, 1, 1)).unwrap();
    assert_eq!(u16::from_be_bytes([level1[0], level1[1]]), 503);
}

#[test]
fn test_export_float32() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");

    export(&gray32f_source(64, 48), options(&dir, "out.pyrm")).unwrap();

    let mut reader = RawContainerReader::open(&output).unwrap();
    assert_eq!(reader.pixel_kind(), PixelKind::Float32);
    let level1 = reader.read_region(1, 0, Rect::new(2, 1, 1, 1)).unwrap();
    // Block x 4..6, y 2..4: mean of x*0.5 - y
    let value = f32::from_be_bytes([level1[0], level1[1], level1[2], level1[3]]);
    assert!((value - (2.25 - 2.5)).abs() < 1e-6);
}

#[test]
fn test_export_rgba_drops_alpha() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");

    export(&rgba_source(40, 40), options(&dir, "out.pyrm")).unwrap();

    let mut reader = RawContainerReader::open(&output).unwrap();
    assert_eq!(reader.pixel_kind(), PixelKind::Rgb8);
    let pixel = reader.read_region(0, 0, Rect::new(5, 7, 1, 1)).unwrap();
    assert_eq!(pixel, vec![5, 7, 12]);
}

#[test]
fn test_export_raw_stack() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("stack.raw");
    let output = dir.path().join("stack.pyrm");

    // Two little-endian u16 channels of 50x20
    let mut bytes = Vec::new();
    for c in 0..2u16 {
        for y in 0..20u16 {
            for x in 0..50u16 {
                bytes.extend_from_slice(&(c * 10_000 + y * 100 + x).to_le_bytes());
            }
        }
    }
    fs::write(&input, bytes).unwrap();

    let layout = RawStackLayout {
        dimensions: ImageDimensions {
            size_x: 50,
            size_y: 20,
            size_c: 2,
            size_z: 1,
            size_t: 1,
        },
        pixel_type: PixelType::Uint16,
        little_endian: true,
    };
    let source = RawStackSource::open(&input, layout).unwrap();
    let opts = ExportOptions::new(&output)
        .with_tile_size(16, 16)
        .with_channels("1")
        .with_threads(2);
    let summary = export(&source, opts).unwrap();
    assert_eq!(summary.plane_count, 1);

    let mut reader = RawContainerReader::open(&output).unwrap();
    let data = reader.read_region(0, 0, Rect::new(17, 19, 1, 1)).unwrap();
    assert_eq!(data, (10_000u16 + 1900 + 17).to_be_bytes().to_vec());
}

// =============================================================================
// Options and Reporting
// =============================================================================

#[test]
fn test_automatic_level_count() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(300, 200, 1, 1, 1);

    let opts = ExportOptions::new(dir.path().join("out.pyrm"))
        .with_tile_size(64, 64)
        .with_threads(2);
    let summary = export(&source, opts).unwrap();

    let last = summary.levels.last().unwrap();
    assert!(last.width <= 32 && last.height <= 32);
    let before_last = &summary.levels[summary.levels.len() - 2];
    assert!(before_last.width > 32 || before_last.height > 32);
}

#[test]
fn test_progress_reaches_total() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(100, 70, 1, 1, 1);
    let seen: Arc<Mutex<Vec<ExportProgress>>> = Arc::default();

    let sink = Arc::clone(&seen);
    let exporter = PyramidExporter::new(options(&dir, "out.pyrm").with_threads(2))
        .on_progress(move |progress| sink.lock().unwrap().push(progress));
    let summary = exporter.export(&source).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len() as u64, summary.tiles_written);
    let last = seen.last().unwrap();
    assert_eq!(last.tiles_written, last.tiles_total);
    assert_eq!(last.level, 2);
    assert!(seen.windows(2).all(|w| w[0].level <= w[1].level));
}

#[test]
fn test_summary_serializes_to_json() {
    let dir = TempDir::new().unwrap();
    let summary = export(&pattern_source(40, 40, 1, 1, 1), options(&dir, "out.pyrm")).unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["plane_count"], 1);
    assert_eq!(json["levels"].as_array().unwrap().len(), 3);
    assert_eq!(json["levels"][1]["width"], 20);
}

#[test]
fn test_overwrite_replaces_existing_output() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.pyrm");
    fs::write(&output, b"stale").unwrap();
    let source = pattern_source(40, 40, 1, 1, 1);

    let result = export(&source, options(&dir, "out.pyrm"));
    assert!(matches!(result, Err(ExportError::OutputExists(_))));
    assert_eq!(fs::read(&output).unwrap(), b"stale");

    export(&source, options(&dir, "out.pyrm").with_overwrite(true)).unwrap();
    assert!(RawContainerReader::open(&output).is_ok());
}
