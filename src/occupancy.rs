//! Registry of positions currently claimed by an agent.
//!
//! Every public operation takes the registry lock for exactly one set
//! operation, so calls from different threads never observe a half-applied
//! update. Nothing here fails short of allocation failure.

use brownian_common::{Position, PositionKey};
use log::debug;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

static GLOBAL: OnceLock<OccupancyTracker> = OnceLock::new();

/// Thread-safe set of occupied positions.
#[derive(Debug, Default)]
pub struct OccupancyTracker {
    positions: Mutex<HashSet<PositionKey>>,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh tracker behind a shared handle, ready to be passed to every step.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Process-wide tracker, created on first use.
    ///
    /// Concurrent first callers all observe the same instance; only one of
    /// them runs the initializer.
    pub fn global() -> &'static OccupancyTracker {
        GLOBAL.get_or_init(|| {
            debug!("Creating process-wide occupancy tracker.");
            OccupancyTracker::new()
        })
    }

    // A panic elsewhere cannot leave the set mid-update, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashSet<PositionKey>> {
        self.positions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_occupied(&self, position: Position) -> bool {
        self.lock().contains(&position.key())
    }

    /// Marks `position` occupied. Occupying an occupied position is a no-op.
    pub fn occupy(&self, position: Position) {
        self.lock().insert(position.key());
    }

    /// Releases `position`. Freeing a free position is a no-op.
    pub fn free(&self, position: Position) {
        self.lock().remove(&position.key());
    }

    /// Occupies `position` only if it is free, in one locked operation.
    /// Returns `true` when this call performed the insertion.
    pub fn try_claim(&self, position: Position) -> bool {
        self.lock().insert(position.key())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the registry contents, in no particular order.
    pub fn occupied_positions(&self) -> Vec<Position> {
        self.lock().iter().map(|key| key.position()).collect()
    }

    /// Drops every entry and releases the registry storage.
    ///
    /// Callers must make sure no step is running. The tracker stays usable
    /// afterwards and starts out empty.
    pub fn shutdown(&self) {
        let mut positions = self.lock();
        let released = positions.len();
        positions.clear();
        positions.shrink_to_fit();
        debug!("Occupancy tracker shut down, released {} positions.", released);
    }
}
