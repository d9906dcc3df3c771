//! Tile workers.
//!
//! A worker repeatedly takes a coordinate from the coordinate space, computes
//! the tile and hands it to the pending map:
//!
//! - level 0: read the tile rectangle from the source plane and encode it
//! - level r > 0: wait for the level gate, read the matching region of level
//!   r-1 from its scratch file and box-average it
//!
//! Each worker owns its encoder, downsampler and scratch reader; nothing here
//! is shared between threads except through the pending map.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use tracing::debug;

use super::pending::PendingTiles;
use crate::cancel::{lock, CancelHandle};
use crate::container::{ContainerFormat, ContainerReader};
use crate::error::ExportError;
use crate::region::Rect;
use crate::source::{ImageSource, PixelKind, PlaneSelector};
use crate::subset::AxisSubsets;
use crate::tile::{
    BoxDownsampler, PixelEncoder, PlaneCounts, PyramidPlan, SampleLayout, TileCoordinate,
    TileCoordinateSpace,
};

// =============================================================================
// Run Context
// =============================================================================

/// Stop signal and first failure of one export run.
#[derive(Debug)]
pub(crate) struct RunContext {
    pub(crate) stop: CancelHandle,
    failure: Mutex<Option<ExportError>>,
}

impl RunContext {
    pub(crate) fn new() -> Self {
        Self {
            stop: CancelHandle::new(),
            failure: Mutex::new(None),
        }
    }

    /// Record `error` unless an earlier failure exists, then stop the run.
    pub(crate) fn fail(&self, error: ExportError) {
        {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                debug!(error = %error, "Export run failed");
                *failure = Some(error);
            }
        }
        self.stop.cancel();
    }

    pub(crate) fn take_failure(&self) -> Option<ExportError> {
        lock(&self.failure).take()
    }
}

/// Marks the run as failed if its thread unwinds.
pub(crate) struct PanicGuard<'a>(pub(crate) &'a RunContext);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.fail(ExportError::WorkerPanicked);
        }
    }
}

// =============================================================================
// Tile Job
// =============================================================================

/// Everything a worker needs to compute any tile of one export.
pub(crate) struct TileJob<'a, S, F> {
    pub(crate) source: &'a S,
    pub(crate) format: &'a F,
    pub(crate) plan: &'a PyramidPlan,
    pub(crate) subsets: &'a AxisSubsets,
    pub(crate) planes: PlaneCounts,
    pub(crate) kind: PixelKind,
    pub(crate) scratch_dir: &'a Path,
}

/// Path of the scratch file holding level `level`.
pub(crate) fn scratch_path(dir: &Path, level: usize) -> PathBuf {
    dir.join(format!("level-{}.pyrm", level))
}

// =============================================================================
// Tile Worker
// =============================================================================

pub(crate) struct TileWorker<'a, S, F: ContainerFormat> {
    job: &'a TileJob<'a, S, F>,
    encoder: PixelEncoder,
    downsampler: BoxDownsampler,
    /// Open scratch reader and the level it holds
    reader: Option<(usize, F::Reader)>,
}

impl<'a, S, F> TileWorker<'a, S, F>
where
    S: ImageSource,
    F: ContainerFormat,
{
    pub(crate) fn new(job: &'a TileJob<'a, S, F>) -> Self {
        Self {
            job,
            encoder: PixelEncoder::new(),
            downsampler: BoxDownsampler::new(),
            reader: None,
        }
    }

    /// Pull coordinates until the space is exhausted or the run stops.
    pub(crate) fn run(
        mut self,
        id: usize,
        space: &TileCoordinateSpace,
        pending: &PendingTiles,
        ctx: &RunContext,
    ) {
        debug!(worker = id, "Worker started");
        let mut computed = 0u64;

        while let Some(coord) = space.next_coordinate(&ctx.stop) {
            if coord.resolution > 0 && !pending.wait_for_level(coord.resolution, &ctx.stop) {
                break;
            }
            match self.compute(coord) {
                Ok(data) => {
                    pending.insert(coord, data);
                    computed += 1;
                }
                Err(e) => {
                    ctx.fail(e);
                    break;
                }
            }
        }

        self.reader = None;
        debug!(worker = id, tiles = computed, "Worker finished");
    }

    /// Compute the bytes of one tile.
    pub(crate) fn compute(&mut self, coord: TileCoordinate) -> Result<Bytes, ExportError> {
        let plan = self.job.plan;
        let invalid = || ExportError::InvalidTile {
            level: coord.resolution,
            row: coord.row,
            col: coord.col,
        };
        let rect = plan
            .level(coord.resolution)
            .and_then(|level| level.tile_rect(coord.row, coord.col))
            .ok_or_else(invalid)?;

        if coord.resolution == 0 {
            return self.encode_source_tile(coord, rect);
        }

        let src_rect = plan.source_rect(coord.resolution, rect).ok_or_else(invalid)?;
        let plane = self.job.planes.plane_index(&coord);
        let previous = self.reader_for(coord.resolution - 1)?;
        let data = previous.read_region(0, plane, src_rect)?;

        let scaled = self.downsampler.downsample(
            &data,
            src_rect.width,
            src_rect.height,
            plan.downsample(),
            SampleLayout::for_kind(self.job.kind),
        )?;
        Ok(Bytes::from(scaled))
    }

    fn encode_source_tile(&self, coord: TileCoordinate, rect: Rect) -> Result<Bytes, ExportError> {
        let subsets = self.job.subsets;
        let invalid = || ExportError::InvalidTile {
            level: coord.resolution,
            row: coord.row,
            col: coord.col,
        };
        let selector = PlaneSelector::new(
            subsets.channels.get(coord.c as usize).ok_or_else(invalid)?,
            subsets.z.get(coord.z as usize).ok_or_else(invalid)?,
            subsets.t.get(coord.t as usize).ok_or_else(invalid)?,
        );

        let region = self.job.source.read_region(selector, rect)?;
        let local = Rect::new(0, 0, rect.width, rect.height);
        Ok(self.encoder.encode(&region, local, self.job.kind)?)
    }

    /// Reader for the scratch file of `level`, reopened when the level changes.
    fn reader_for(&mut self, level: usize) -> Result<&mut F::Reader, ExportError> {
        let reader = match self.reader.take() {
            Some((open, reader)) if open == level => reader,
            _ => {
                let path = scratch_path(self.job.scratch_dir, level);
                let reader = self.job.format.open(&path)?;
                debug!(level, path = %path.display(), "Opened scratch level");
                reader
            }
        };
        Ok(&mut self.reader.insert((level, reader)).1)
    }
}
