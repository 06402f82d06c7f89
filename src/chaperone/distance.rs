//! Boundary distance engine
//!
//! Owns the current boundary polygon and answers nearest-wall queries. The
//! network task replaces the polygon wholesale; the render tick reads it.
//! Every public read and write goes through the engine lock. A published
//! polygon is immutable, so once a caller holds a snapshot it can run as many
//! queries against it as it likes without touching the lock again.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::polygon::{BoundaryDistanceSample, BoundaryPolygon};
use crate::tracking::{BoundsSource, RuntimeError, SharedRuntime, TrackingRuntime};
use crate::util::vec3::Vec3;

pub struct BoundaryDistanceEngine {
    polygon: RwLock<Arc<BoundaryPolygon>>,
}

impl BoundaryDistanceEngine {
    pub fn new() -> Self {
        Self {
            polygon: RwLock::new(Arc::new(BoundaryPolygon::empty())),
        }
    }

    /// Rebuilds the polygon from the runtime's live or working boundary
    ///
    /// On error the previous polygon stays in place.
    pub fn load_chaperone_data(
        &self,
        runtime: &SharedRuntime,
        source: BoundsSource,
    ) -> Result<Arc<BoundaryPolygon>, RuntimeError> {
        let guard = runtime.lock();
        self.load_from(&*guard, source)
    }

    /// Same as [`load_chaperone_data`](Self::load_chaperone_data) for a caller
    /// that already holds the runtime guard
    pub fn load_from(
        &self,
        runtime: &dyn TrackingRuntime,
        source: BoundsSource,
    ) -> Result<Arc<BoundaryPolygon>, RuntimeError> {
        let quads = runtime.collision_bounds(source)?;
        let polygon = BoundaryPolygon::from_quads(&quads);

        if !polygon.is_well_formed() {
            warn!(
                "Boundary from {:?} bounds is not well-formed ({} walls), comfort features suspended",
                source,
                polygon.wall_count()
            );
        } else {
            debug!("Loaded {} boundary walls from {:?} bounds", polygon.wall_count(), source);
        }

        Ok(self.publish(polygon))
    }

    /// Replaces the current polygon
    pub fn publish(&self, polygon: BoundaryPolygon) -> Arc<BoundaryPolygon> {
        let polygon = Arc::new(polygon);
        *self.polygon.write() = polygon.clone();
        polygon
    }

    /// Current polygon; never blocks on a writer for longer than a pointer swap
    pub fn snapshot(&self) -> Arc<BoundaryPolygon> {
        self.polygon.read().clone()
    }

    pub fn is_chaperone_well_formed(&self) -> bool {
        self.polygon.read().is_well_formed()
    }

    pub fn quads_count(&self) -> usize {
        self.polygon.read().wall_count()
    }

    pub fn corner(&self, index: usize) -> Option<Vec3> {
        self.polygon.read().corner(index)
    }

    /// One sample per wall, in polygon order
    pub fn distances_to_chaperone(&self, point: Vec3) -> Vec<BoundaryDistanceSample> {
        self.snapshot().distances_to(point)
    }

    /// Nearest wall, or a NaN sample when there are no walls
    pub fn distance_to_chaperone(&self, point: Vec3) -> BoundaryDistanceSample {
        self.snapshot().nearest(point)
    }
}

impl Default for BoundaryDistanceEngine {
    fn default() -> Self {
        Self::new()
    }
}
