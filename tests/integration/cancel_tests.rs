//! Cancellation, failure and backpressure tests.
//!
//! Every failed or canceled export must leave no output and no scratch files
//! behind.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use pyramid_export::error::{ContainerError, DownsampleError, SourceError};
use pyramid_export::source::PixelType;
use pyramid_export::{ExportError, ExportOptions, PyramidExporter};

use super::test_utils::{
    dir_entries, pattern_source, Float64Source, InstrumentedSource, ReadFault, RecordingFormat,
};

fn options(dir: &TempDir) -> ExportOptions {
    ExportOptions::new(dir.path().join("out.pyrm"))
        .with_tile_size(16, 16)
        .with_resolution_levels(3)
        .with_temp_dir(dir.path())
}

/// Nothing but the files created by the test itself.
fn assert_clean(dir: &TempDir) {
    assert!(
        dir_entries(dir.path()).is_empty(),
        "leftover files: {:?}",
        dir_entries(dir.path())
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancel_from_worker_read() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(options(&dir).with_threads(4));
    let source = InstrumentedSource::new(pattern_source(128, 128, 1, 1, 1))
        .with_fault(10, ReadFault::Cancel(exporter.cancel_handle()));

    let result = exporter.export(&source);
    assert!(matches!(result, Err(ExportError::Canceled)));
    assert_clean(&dir);
}

#[test]
fn test_cancel_from_progress_callback() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(options(&dir).with_threads(2));
    let cancel = exporter.cancel_handle();
    let exporter = exporter.on_progress(move |progress| {
        if progress.tiles_written == 5 {
            cancel.cancel();
        }
    });

    let result = exporter.export(&pattern_source(128, 128, 1, 1, 1));
    assert!(matches!(result, Err(ExportError::Canceled)));
    assert_clean(&dir);
}

#[test]
fn test_cancel_before_start_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(options(&dir));
    exporter.cancel_handle().cancel();

    let result = exporter.export(&pattern_source(64, 64, 1, 1, 1));
    assert!(matches!(result, Err(ExportError::Canceled)));
    assert!(exporter.cancel_handle().is_canceled());
    assert_clean(&dir);
}

#[test]
fn test_cancel_from_another_thread() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(
        options(&dir)
            .with_threads(3)
            .with_max_tiles_in_queue(2),
    );
    let cancel = exporter.cancel_handle();
    let source = InstrumentedSource::new(pattern_source(256, 256, 1, 1, 1))
        .with_delay(Duration::from_millis(5));

    let result = thread::scope(|scope| {
        scope.spawn(|| {
            while source.reads() < 4 {
                thread::sleep(Duration::from_millis(1));
            }
            cancel.cancel();
        });
        exporter.export(&source)
    });

    assert!(matches!(result, Err(ExportError::Canceled)));
    // 256 level-0 tiles plus 80 coarser ones were never all read
    assert!(source.reads() < 256);
    assert_clean(&dir);
}

#[test]
fn test_cancel_inline_export() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(options(&dir).with_threads(0));
    let source = InstrumentedSource::new(pattern_source(64, 64, 1, 1, 1))
        .with_fault(3, ReadFault::Cancel(exporter.cancel_handle()));

    let result = exporter.export(&source);
    assert!(matches!(result, Err(ExportError::Canceled)));
    assert_clean(&dir);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_source_failure_aborts_export() {
    let dir = TempDir::new().unwrap();
    let source =
        InstrumentedSource::new(pattern_source(128, 128, 1, 1, 1)).with_fault(7, ReadFault::Fail);

    let result = PyramidExporter::new(options(&dir).with_threads(4)).export(&source);
    assert!(matches!(
        result,
        Err(ExportError::Source(SourceError::Io(_)))
    ));
    assert_clean(&dir);
}

#[test]
fn test_source_failure_inline() {
    let dir = TempDir::new().unwrap();
    let source =
        InstrumentedSource::new(pattern_source(64, 64, 1, 1, 1)).with_fault(0, ReadFault::Fail);

    let result = PyramidExporter::new(options(&dir).with_threads(0)).export(&source);
    assert!(matches!(result, Err(ExportError::Source(_))));
    assert_eq!(source.reads(), 1);
    assert_clean(&dir);
}

#[test]
fn test_worker_panic_is_reported() {
    let dir = TempDir::new().unwrap();
    let source =
        InstrumentedSource::new(pattern_source(128, 128, 1, 1, 1)).with_fault(5, ReadFault::Panic);

    let result = PyramidExporter::new(options(&dir).with_threads(2)).export(&source);
    assert!(matches!(result, Err(ExportError::WorkerPanicked)));
    assert_clean(&dir);
}

#[test]
fn test_writer_panic_releases_workers() {
    let dir = TempDir::new().unwrap();
    let exporter = PyramidExporter::new(
        options(&dir)
            .with_threads(2)
            .with_max_tiles_in_queue(1),
    )
    .on_progress(|progress| {
        if progress.tiles_written == 2 {
            panic!("progress callback failed");
        }
    });
    let source = pattern_source(128, 128, 1, 1, 1);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| exporter.export(&source)));
        let _ = tx.send(outcome.is_err());
    });

    let panicked = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("export did not return after the writer panicked");
    assert!(panicked);
    assert_clean(&dir);
}

#[test]
fn test_write_failure_aborts_export() {
    let dir = TempDir::new().unwrap();
    let format = RecordingFormat::failing_after(6);
    let source = pattern_source(128, 128, 1, 1, 1);

    let result =
        PyramidExporter::with_format(options(&dir).with_threads(4), format).export(&source);
    assert!(matches!(
        result,
        Err(ExportError::Container(ContainerError::Io(_)))
    ));
    assert_clean(&dir);
}

#[test]
fn test_unsupported_pixel_type_creates_nothing() {
    let dir = TempDir::new().unwrap();

    let result = PyramidExporter::new(options(&dir)).export(&Float64Source);
    assert!(matches!(
        result,
        Err(ExportError::UnsupportedPixelType(PixelType::Float64))
    ));
    assert_clean(&dir);
}

#[test]
fn test_invalid_subset_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(32, 32, 2, 1, 1);

    let result = PyramidExporter::new(options(&dir).with_channels("0:5")).export(&source);
    assert!(matches!(
        result,
        Err(ExportError::Range {
            axis: "channel",
            ..
        })
    ));
    assert_clean(&dir);
}

#[test]
fn test_zero_downsample_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(32, 32, 1, 1, 1);

    let result = PyramidExporter::new(options(&dir).with_downsample(0)).export(&source);
    assert!(matches!(
        result,
        Err(ExportError::Downsample(DownsampleError::InvalidScaleFactor(_)))
    ));
    assert_clean(&dir);
}

#[test]
fn test_too_many_levels_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(32, 32, 1, 1, 1);

    let result =
        PyramidExporter::new(options(&dir).with_resolution_levels(7)).export(&source);
    assert!(matches!(result, Err(ExportError::InvalidOptions(_))));
    assert_clean(&dir);
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_in_flight_tiles_are_bounded() {
    let dir = TempDir::new().unwrap();
    let source = InstrumentedSource::new(pattern_source(128, 96, 2, 1, 1))
        .with_delay(Duration::from_millis(1));

    for max in [1, 2, 5] {
        let opts = ExportOptions::new(dir.path().join(format!("out-{}.pyrm", max)))
            .with_tile_size(16, 16)
            .with_resolution_levels(3)
            .with_temp_dir(dir.path())
            .with_threads(4)
            .with_max_tiles_in_queue(max);
        let summary = PyramidExporter::new(opts).export(&source).unwrap();
        assert!(summary.peak_in_flight >= 1);
        assert!(
            summary.peak_in_flight <= max,
            "peak {} exceeds {}",
            summary.peak_in_flight,
            max
        );
    }
}

#[test]
fn test_single_tile_window_with_many_threads() {
    let dir = TempDir::new().unwrap();
    let source = pattern_source(64, 64, 3, 1, 1);

    let opts = options(&dir).with_threads(8).with_max_tiles_in_queue(1);
    let summary = PyramidExporter::new(opts).export(&source).unwrap();
    assert_eq!(summary.peak_in_flight, 1);
    // (16 + 4 + 1) tiles for each of 3 planes
    assert_eq!(summary.tiles_written, 63);
}
