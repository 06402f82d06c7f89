pub mod distance;
pub mod events;
pub mod polygon;

pub use distance::BoundaryDistanceEngine;
pub use events::{BoundaryEvent, BoundaryNotifier};
pub use polygon::{nearest_sample, BoundaryDistanceSample, BoundaryPolygon};
