//! Tile coordinates and the bounded coordinate space handed to workers.
//!
//! Coordinates are issued in a fixed nested order:
//!
//! ```text
//! resolution → t → c → z → row → col
//! ```
//!
//! The writer consumes tiles in the same order, so the set of issued but not
//! yet consumed coordinates is always a contiguous window starting at the
//! tile the writer needs next. Bounding that window bounds memory.

use std::sync::{Condvar, Mutex, PoisonError};

use serde::Serialize;

use super::plan::PyramidPlan;
use crate::cancel::{lock, CancelHandle, Interrupt};

// =============================================================================
// TileCoordinate
// =============================================================================

/// Address of one output tile.
///
/// `t`, `c` and `z` are positions inside the selected subsets, not source
/// indices. Ordering follows issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TileCoordinate {
    pub resolution: usize,
    pub t: u32,
    pub c: u32,
    pub z: u32,
    pub row: u32,
    pub col: u32,
}

impl TileCoordinate {
    pub const fn new(resolution: usize, t: u32, c: u32, z: u32, row: u32, col: u32) -> Self {
        Self {
            resolution,
            t,
            c,
            z,
            row,
            col,
        }
    }
}

/// Number of selected positions on each non-spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneCounts {
    pub t: u32,
    pub c: u32,
    pub z: u32,
}

impl PlaneCounts {
    pub const fn new(t: u32, c: u32, z: u32) -> Self {
        Self { t, c, z }
    }

    /// Planes per level.
    pub fn plane_count(&self) -> usize {
        self.t as usize * self.c as usize * self.z as usize
    }

    /// Container plane index of a coordinate: `(t * C + c) * Z + z`.
    pub fn plane_index(&self, coord: &TileCoordinate) -> usize {
        (coord.t as usize * self.c as usize + coord.c as usize) * self.z as usize
            + coord.z as usize
    }
}

/// Tile grid size of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }
}

// =============================================================================
// CoordinateOrder
// =============================================================================

/// The deterministic sequence of every tile coordinate of an export.
#[derive(Debug, Clone)]
pub struct CoordinateOrder {
    grids: Vec<TileGrid>,
    planes: PlaneCounts,
}

impl CoordinateOrder {
    pub fn new(grids: Vec<TileGrid>, planes: PlaneCounts) -> Self {
        Self { grids, planes }
    }

    pub fn from_plan(plan: &PyramidPlan, planes: PlaneCounts) -> Self {
        let grids = plan
            .levels()
            .iter()
            .map(|level| TileGrid {
                tiles_x: level.tiles_x,
                tiles_y: level.tiles_y,
            })
            .collect();
        Self::new(grids, planes)
    }

    pub fn planes(&self) -> PlaneCounts {
        self.planes
    }

    pub fn level_count(&self) -> usize {
        self.grids.len()
    }

    /// Coordinates at one level.
    pub fn level_total(&self, level: usize) -> u64 {
        self.grids
            .get(level)
            .map_or(0, |grid| grid.tile_count() * self.planes.plane_count() as u64)
    }

    /// Coordinates over every level.
    pub fn total(&self) -> u64 {
        (0..self.grids.len()).map(|level| self.level_total(level)).sum()
    }

    /// First coordinate at `level` or any later level that has tiles.
    pub fn first_from(&self, level: usize) -> Option<TileCoordinate> {
        (level..self.grids.len())
            .find(|&r| self.level_total(r) > 0)
            .map(|r| TileCoordinate::new(r, 0, 0, 0, 0, 0))
    }

    /// Coordinate issued after `coord`, or `None` after the last one.
    pub fn advance(&self, coord: TileCoordinate) -> Option<TileCoordinate> {
        let grid = self.grids.get(coord.resolution)?;
        let planes = &self.planes;
        let mut next = coord;

        next.col += 1;
        if next.col < grid.tiles_x {
            return Some(next);
        }
        next.col = 0;
        next.row += 1;
        if next.row < grid.tiles_y {
            return Some(next);
        }
        next.row = 0;
        next.z += 1;
        if next.z < planes.z {
            return Some(next);
        }
        next.z = 0;
        next.c += 1;
        if next.c < planes.c {
            return Some(next);
        }
        next.c = 0;
        next.t += 1;
        if next.t < planes.t {
            return Some(next);
        }

        self.first_from(coord.resolution + 1)
    }

    /// Every coordinate in issue order.
    pub fn iter(&self) -> CoordinateIter<'_> {
        CoordinateIter {
            order: self,
            next: self.first_from(0),
            level: None,
        }
    }

    /// Coordinates of a single level in issue order.
    pub fn level(&self, level: usize) -> CoordinateIter<'_> {
        let next = if self.level_total(level) > 0 {
            Some(TileCoordinate::new(level, 0, 0, 0, 0, 0))
        } else {
            None
        };
        CoordinateIter {
            order: self,
            next,
            level: Some(level),
        }
    }
}

/// Iterator over a [`CoordinateOrder`].
#[derive(Debug, Clone)]
pub struct CoordinateIter<'a> {
    order: &'a CoordinateOrder,
    next: Option<TileCoordinate>,
    level: Option<usize>,
}

impl Iterator for CoordinateIter<'_> {
    type Item = TileCoordinate;

    fn next(&mut self) -> Option<TileCoordinate> {
        let current = self.next?;
        self.next = self
            .order
            .advance(current)
            .filter(|next| self.level.map_or(true, |level| next.resolution == level));
        Some(current)
    }
}

// =============================================================================
// TileCoordinateSpace
// =============================================================================

#[derive(Debug)]
struct SpaceState {
    next: Option<TileCoordinate>,
    issued: u64,
    in_flight: usize,
    peak: usize,
}

/// Issues tile coordinates to workers with backpressure.
///
/// At most `max_in_flight` coordinates can be issued without having been
/// acknowledged by the consumer. A worker asking for more blocks until the
/// consumer catches up or the export is stopped.
#[derive(Debug)]
pub struct TileCoordinateSpace {
    order: CoordinateOrder,
    max_in_flight: usize,
    total: u64,
    state: Mutex<SpaceState>,
    slot_freed: Condvar,
}

impl TileCoordinateSpace {
    /// Create a space over `order`. A bound of 0 is treated as 1.
    pub fn new(order: CoordinateOrder, max_in_flight: usize) -> Self {
        let total = order.total();
        let next = order.first_from(0);
        Self {
            order,
            max_in_flight: max_in_flight.max(1),
            total,
            state: Mutex::new(SpaceState {
                next,
                issued: 0,
                in_flight: 0,
                peak: 0,
            }),
            slot_freed: Condvar::new(),
        }
    }

    pub fn order(&self) -> &CoordinateOrder {
        &self.order
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Issue the next coordinate.
    ///
    /// Blocks while the in-flight bound is reached. Returns `None` once every
    /// coordinate has been issued or when `stop` is cancelled.
    pub fn next_coordinate(&self, stop: &CancelHandle) -> Option<TileCoordinate> {
        let mut state = lock(&self.state);
        loop {
            if stop.is_canceled() {
                return None;
            }
            let coord = state.next?;
            if state.in_flight < self.max_in_flight {
                state.next = self.order.advance(coord);
                state.issued += 1;
                state.in_flight += 1;
                state.peak = state.peak.max(state.in_flight);
                return Some(coord);
            }
            state = self
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Record that the consumer is done with one issued coordinate.
    pub fn acknowledge_consumed(&self) {
        let mut state = lock(&self.state);
        debug_assert!(state.in_flight > 0, "acknowledge without an issued tile");
        state.in_flight = state.in_flight.saturating_sub(1);
        // Every waiter must re-check: the freed slot may be the last one any
        // of them will ever see before exhaustion.
        self.slot_freed.notify_all();
    }

    /// Whether the last coordinate has been issued.
    pub fn is_exhausted(&self) -> bool {
        lock(&self.state).next.is_none()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn issued(&self) -> u64 {
        lock(&self.state).issued
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight
    }

    /// Highest in-flight count observed.
    pub fn peak_in_flight(&self) -> usize {
        lock(&self.state).peak
    }
}

impl Interrupt for TileCoordinateSpace {
    fn interrupt(&self) {
        let _state = lock(&self.state);
        self.slot_freed.notify_all();
    }
}

// =============================================================================
// Tests
// =============================================================================
