//! Finished tiles waiting for the writer, and the level gate.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};

use bytes::Bytes;

use crate::cancel::{lock, CancelHandle, Interrupt};
use crate::tile::TileCoordinate;

#[derive(Debug, Default)]
struct PendingState {
    tiles: HashMap<TileCoordinate, Bytes>,
    /// Highest level workers may compute
    gate: usize,
}

/// Tiles computed by workers, keyed by coordinate, plus the gate that holds
/// back downsampling until the previous level is complete on disk.
///
/// Workers insert in any order; the single writer takes tiles one by one in
/// issue order.
#[derive(Debug, Default)]
pub(crate) struct PendingTiles {
    state: Mutex<PendingState>,
    tile_ready: Condvar,
    gate_opened: Condvar,
}

impl PendingTiles {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, coord: TileCoordinate, data: Bytes) {
        let mut state = lock(&self.state);
        state.tiles.insert(coord, data);
        // single consumer
        self.tile_ready.notify_one();
    }

    /// Remove the tile at `coord`, waiting until a worker provides it.
    ///
    /// Returns `None` if `stop` is cancelled first.
    pub(crate) fn take(&self, coord: TileCoordinate, stop: &CancelHandle) -> Option<Bytes> {
        let mut state = lock(&self.state);
        loop {
            if stop.is_canceled() {
                return None;
            }
            if let Some(data) = state.tiles.remove(&coord) {
                return Some(data);
            }
            state = self
                .tile_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait until tiles of `level` may be computed.
    ///
    /// Returns `false` if `stop` is cancelled first.
    pub(crate) fn wait_for_level(&self, level: usize, stop: &CancelHandle) -> bool {
        let mut state = lock(&self.state);
        loop {
            if stop.is_canceled() {
                return false;
            }
            if state.gate >= level {
                return true;
            }
            state = self
                .gate_opened
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Allow workers to compute tiles up to `level`.
    pub(crate) fn open_level(&self, level: usize) {
        let mut state = lock(&self.state);
        state.gate = state.gate.max(level);
        self.gate_opened.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).tiles.len()
    }
}

impl Interrupt for PendingTiles {
    fn interrupt(&self) {
        let _state = lock(&self.state);
        self.tile_ready.notify_all();
        self.gate_opened.notify_all();
    }
}
