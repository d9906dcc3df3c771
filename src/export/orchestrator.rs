//! Pyramid export orchestration.
//!
//! # Pipeline
//!
//! ```text
//!                   ┌──────────────────────┐
//!                   │ TileCoordinateSpace  │  at most max_tiles_in_queue
//!                   └──────────┬───────────┘  coordinates in flight
//!            ┌─────────────────┼─────────────────┐
//!            ▼                 ▼                 ▼
//!      ┌──────────┐      ┌──────────┐      ┌──────────┐
//!      │ worker 0 │      │ worker 1 │ ...  │ worker N │
//!      └────┬─────┘      └────┬─────┘      └────┬─────┘
//!           └─────────────────┼─────────────────┘
//!                             ▼
//!                   ┌──────────────────────┐
//!                   │     PendingTiles     │  coordinate → bytes
//!                   └──────────┬───────────┘
//!                              ▼ in issue order
//!                   ┌──────────────────────┐
//!                   │  writer (this thread)│──▶ output container
//!                   └──────────────────────┘──▶ scratch file of level r
//! ```
//!
//! For every level the writer first creates the scratch file that level
//! r + 1 will be downsampled from, opens the level gate, then writes tiles
//! in order. Once a level is complete its scratch file is closed and the
//! scratch file of the level before it is deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::options::ExportOptions;
use super::pending::PendingTiles;
use super::worker::{scratch_path, PanicGuard, RunContext, TileJob, TileWorker};
use crate::cancel::{CancelHandle, Interrupt};
use crate::container::{ContainerDescriptor, ContainerFormat, ContainerWriter, RawContainerFormat};
use crate::error::ExportError;
use crate::source::{ImageSource, PixelKind};
use crate::subset::AxisSubsets;
use crate::tile::{
    CoordinateOrder, LevelInfo, PlaneCounts, PyramidPlan, ScaleFactor, TileCoordinate,
    TileCoordinateSpace,
};

/// Prefix of the scratch directory created for each export.
const SCRATCH_PREFIX: &str = ".pyramid-export-";

// =============================================================================
// Progress & Summary
// =============================================================================

/// Progress reported after every written tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    /// Level being written
    pub level: usize,
    pub level_count: usize,
    pub tiles_written: u64,
    pub tiles_total: u64,
}

/// Result of a completed export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub pixel_kind: PixelKind,
    pub plane_count: usize,
    pub levels: Vec<LevelInfo>,
    pub tiles_written: u64,
    /// Highest number of tiles in flight at once
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

type ProgressFn = dyn Fn(ExportProgress) + Send + Sync;

// =============================================================================
// Setup
// =============================================================================

/// Everything resolved before any file is touched.
struct ExportSetup {
    subsets: AxisSubsets,
    kind: PixelKind,
    plan: PyramidPlan,
    planes: PlaneCounts,
}

/// Deletes the output file unless the export completed.
struct OutputGuard<'a> {
    path: &'a Path,
    committed: bool,
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial output"),
        }
    }
}

// =============================================================================
// PyramidExporter
// =============================================================================

/// Exports an image source as a tiled multi-resolution container.
///
/// # Example
///
/// ```no_run
/// use image::GrayImage;
/// use pyramid_export::export::{ExportOptions, PyramidExporter};
/// use pyramid_export::source::{InMemorySource, PixelPlane};
///
/// let source = InMemorySource::single(PixelPlane::Gray8(GrayImage::new(4096, 4096)));
/// let exporter = PyramidExporter::new(ExportOptions::new("slide.pyrm").with_threads(4));
///
/// let cancel = exporter.cancel_handle();
/// // hand `cancel` to another thread to abort the export
///
/// let summary = exporter.export(&source)?;
/// println!("{} tiles in {} levels", summary.tiles_written, summary.levels.len());
/// # Ok::<(), pyramid_export::ExportError>(())
/// ```
pub struct PyramidExporter<F: ContainerFormat = RawContainerFormat> {
    options: ExportOptions,
    format: F,
    cancel: CancelHandle,
    progress: Option<Box<ProgressFn>>,
}

impl PyramidExporter<RawContainerFormat> {
    /// Exporter writing the raw container format.
    pub fn new(options: ExportOptions) -> Self {
        Self::with_format(options, RawContainerFormat)
    }
}

impl<F: ContainerFormat> PyramidExporter<F> {
    /// Exporter writing through a custom container format.
    ///
    /// The format is used for the output and for the per-level scratch files.
    pub fn with_format(options: ExportOptions, format: F) -> Self {
        Self {
            options,
            format,
            cancel: CancelHandle::new(),
            progress: None,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Handle that cancels a running (or future) export from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Register a callback invoked on the writer thread after every tile.
    pub fn on_progress(mut self, callback: impl Fn(ExportProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Run the export.
    ///
    /// Options, subset expressions, pixel type and pyramid geometry are all
    /// checked before the output is created. On failure or cancellation the
    /// partial output and every scratch file are removed.
    pub fn export<S: ImageSource>(&self, source: &S) -> Result<ExportSummary, ExportError> {
        let started = Instant::now();
        let setup = self.prepare(source)?;
        if self.cancel.is_canceled() {
            return Err(ExportError::Canceled);
        }

        let options = &self.options;
        let plan = &setup.plan;
        info!(
            output = %options.output.display(),
            kind = %setup.kind,
            width = plan.level(0).map_or(0, |l| l.width),
            height = plan.level(0).map_or(0, |l| l.height),
            planes = setup.planes.plane_count(),
            levels = plan.level_count(),
            threads = options.threads,
            "Starting pyramid export"
        );

        let scratch_parent = options.scratch_parent();
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&scratch_parent)?;
        debug!(dir = %scratch.path().display(), "Created scratch directory");

        let mut guard = OutputGuard {
            path: &options.output,
            committed: false,
        };
        let descriptor = ContainerDescriptor {
            pixel_kind: setup.kind,
            plane_count: setup.planes.plane_count() as u32,
            tile_width: plan.tile_width(),
            tile_height: plan.tile_height(),
        };
        let mut output = self.format.create(&options.output, &descriptor)?;
        for level in plan.levels() {
            output.declare_level(level.level, level.width, level.height)?;
        }

        let ctx = RunContext::new();
        self.cancel.forward_to(&ctx.stop);

        let order = CoordinateOrder::from_plan(plan, setup.planes);
        let space = Arc::new(TileCoordinateSpace::new(order, options.max_tiles_in_queue));
        let pending = Arc::new(PendingTiles::new());
        let space_listener: Arc<dyn Interrupt> = space.clone();
        let pending_listener: Arc<dyn Interrupt> = pending.clone();
        ctx.stop.subscribe(Arc::downgrade(&space_listener));
        ctx.stop.subscribe(Arc::downgrade(&pending_listener));

        let job = TileJob {
            source,
            format: &self.format,
            plan,
            subsets: &setup.subsets,
            planes: setup.planes,
            kind: setup.kind,
            scratch_dir: scratch.path(),
        };

        let written = if options.threads == 0 {
            let mut worker = TileWorker::new(&job);
            let written = self.write_levels(&job, &mut output, &space, &pending, &ctx, |coord| {
                match space.next_coordinate(&ctx.stop) {
                    Some(issued) => {
                        debug_assert_eq!(issued, coord);
                        worker.compute(issued).map(Some)
                    }
                    None => Ok(None),
                }
            });
            written.unwrap_or_else(|e| {
                ctx.fail(e);
                None
            })
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = (0..options.threads)
                    .map(|id| {
                        let (job, space, pending, ctx) = (&job, &*space, &*pending, &ctx);
                        scope.spawn(move || {
                            let _guard = PanicGuard(ctx);
                            TileWorker::new(job).run(id, space, pending, ctx);
                        })
                    })
                    .collect();

                // Unwinding out of the writer must still release the workers
                let _writer_guard = PanicGuard(&ctx);
                let written = self
                    .write_levels(&job, &mut output, &space, &pending, &ctx, |coord| {
                        Ok(pending.take(coord, &ctx.stop))
                    })
                    .unwrap_or_else(|e| {
                        ctx.fail(e);
                        None
                    });

                for handle in handles {
                    if handle.join().is_err() {
                        ctx.fail(ExportError::WorkerPanicked);
                    }
                }
                written
            })
        };

        if let Some(error) = ctx.take_failure() {
            return Err(error);
        }
        let Some(tiles_written) = written else {
            info!(output = %options.output.display(), "Export canceled");
            return Err(ExportError::Canceled);
        };

        guard.committed = true;
        let summary = ExportSummary {
            output: options.output.clone(),
            pixel_kind: setup.kind,
            plane_count: setup.planes.plane_count(),
            levels: plan.levels().to_vec(),
            tiles_written,
            peak_in_flight: space.peak_in_flight(),
            elapsed: started.elapsed(),
        };
        info!(
            output = %options.output.display(),
            tiles = summary.tiles_written,
            peak_in_flight = summary.peak_in_flight,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Export complete"
        );
        Ok(summary)
    }

    /// Resolve options against the source. Creates nothing on disk.
    fn prepare<S: ImageSource>(&self, source: &S) -> Result<ExportSetup, ExportError> {
        let options = &self.options;
        options.validate()?;

        let dimensions = source.dimensions();
        let subsets = AxisSubsets::parse(&options.subsets, &dimensions)?;
        let plane_count = subsets.plane_count();
        if plane_count == 0 {
            return Err(ExportError::InvalidOptions(
                "subset selection contains no planes".to_string(),
            ));
        }
        if plane_count > u32::MAX as usize {
            return Err(ExportError::InvalidOptions(format!(
                "subset selection contains {} planes",
                plane_count
            )));
        }

        let pixel_type = source.pixel_type();
        let kind = PixelKind::try_from(pixel_type)
            .map_err(|_| ExportError::UnsupportedPixelType(pixel_type))?;

        let downsample = ScaleFactor::new(options.downsample)?;
        let plan = PyramidPlan::new(
            dimensions.size_x,
            dimensions.size_y,
            options.tile_width,
            options.tile_height,
            downsample,
            options.resolution_levels,
        )?;
        plan.check_tile_bytes(kind.bytes_per_pixel())?;

        let planes = PlaneCounts::new(
            subsets.t.len() as u32,
            subsets.channels.len() as u32,
            subsets.z.len() as u32,
        );
        Ok(ExportSetup {
            subsets,
            kind,
            plan,
            planes,
        })
    }

    /// Writer role: consume tiles level by level in issue order.
    ///
    /// `fetch` returns the bytes of the requested tile, or `None` once the run
    /// is stopped. Returns the number of tiles written, or `None` if stopped.
    fn write_levels<S: ImageSource>(
        &self,
        job: &TileJob<'_, S, F>,
        output: &mut F::Writer,
        space: &TileCoordinateSpace,
        pending: &PendingTiles,
        ctx: &RunContext,
        mut fetch: impl FnMut(TileCoordinate) -> Result<Option<Bytes>, ExportError>,
    ) -> Result<Option<u64>, ExportError> {
        let plan = job.plan;
        let order = space.order();
        let level_count = plan.level_count();
        let total = space.total();
        let mut written = 0u64;

        for level in plan.levels() {
            let r = level.level;
            if ctx.stop.is_canceled() {
                return Ok(None);
            }

            let mut scratch = if r + 1 < level_count {
                let descriptor = ContainerDescriptor {
                    pixel_kind: job.kind,
                    plane_count: job.planes.plane_count() as u32,
                    tile_width: plan.tile_width(),
                    tile_height: plan.tile_height(),
                };
                let mut writer = self.format.create(&scratch_path(job.scratch_dir, r), &descriptor)?;
                writer.declare_level(0, level.width, level.height)?;
                Some(writer)
            } else {
                None
            };

            pending.open_level(r);
            info!(
                level = r,
                width = level.width,
                height = level.height,
                tiles = order.level_total(r),
                "Writing level"
            );

            for coord in order.level(r) {
                let Some(data) = fetch(coord)? else {
                    return Ok(None);
                };
                let rect = level
                    .tile_rect(coord.row, coord.col)
                    .ok_or(ExportError::InvalidTile {
                        level: r,
                        row: coord.row,
                        col: coord.col,
                    })?;
                let plane = job.planes.plane_index(&coord);

                if let Some(writer) = scratch.as_mut() {
                    writer.write_tile(0, plane, rect, &data)?;
                }
                output.write_tile(r, plane, rect, &data)?;
                drop(data);
                space.acknowledge_consumed();

                written += 1;
                if let Some(progress) = &self.progress {
                    progress(ExportProgress {
                        level: r,
                        level_count,
                        tiles_written: written,
                        tiles_total: total,
                    });
                }
            }

            if let Some(mut writer) = scratch.take() {
                writer.close()?;
            }
            if r > 0 {
                remove_scratch(&scratch_path(job.scratch_dir, r - 1));
            }
        }

        output.close()?;
        Ok(Some(written))
    }
}

/// Delete a scratch file that is no longer needed.
fn remove_scratch(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed scratch level"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch level"),
    }
}

/// Export `source` with `options` to the raw container format.
pub fn export<S: ImageSource>(source: &S, options: ExportOptions) -> Result<ExportSummary, ExportError> {
    PyramidExporter::new(options).export(source)
}

// =============================================================================
// Tests
// =============================================================================
