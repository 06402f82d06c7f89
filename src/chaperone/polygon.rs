//! Boundary polygon and point-to-boundary distance queries

use serde::Serialize;

use crate::tracking::WallQuad;
use crate::util::vec2::Vec2;
use crate::util::vec3::Vec3;

/// Result of one nearest-point query against a single wall
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundaryDistanceSample {
    /// Horizontal distance from the query point, NaN when unavailable
    pub distance: f32,
    /// Nearest point on the wall, at the query point's height
    pub nearest_point: Vec3,
    /// Floor corners bounding the wall, in polygon order
    pub corners: [Vec3; 2],
    /// Index of the wall within the polygon
    pub wall_index: usize,
}

impl BoundaryDistanceSample {
    /// Sample returned when there is no wall to measure against
    pub fn unavailable() -> Self {
        Self {
            distance: f32::NAN,
            nearest_point: Vec3::new(f32::NAN, f32::NAN, f32::NAN),
            corners: [Vec3::ZERO; 2],
            wall_index: 0,
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        !self.distance.is_nan()
    }

    /// Wall corner closest to `point` in the floor plane
    pub fn closest_corner(&self, point: Vec3) -> Vec3 {
        let p = point.horizontal();
        let a = p.distance_sq_to(self.corners[0].horizontal());
        let b = p.distance_sq_to(self.corners[1].horizontal());
        if a < b {
            self.corners[0]
        } else {
            self.corners[1]
        }
    }

    /// Wall direction in the floor plane, from the first corner to the second
    pub fn wall_direction(&self) -> Vec2 {
        (self.corners[1].horizontal() - self.corners[0].horizontal()).normalize()
    }
}

/// Closed ring of floor corners; wall `i` runs from corner `i` to corner `i + 1`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryPolygon {
    corners: Vec<Vec3>,
    well_formed: bool,
}

impl BoundaryPolygon {
    pub fn empty() -> Self {
        Self {
            corners: Vec::new(),
            well_formed: true,
        }
    }

    /// Polygon from floor corners; corners off the floor make it not well-formed
    pub fn from_corners(corners: Vec<Vec3>) -> Self {
        let well_formed = corners.iter().all(|c| c.y == 0.0);
        Self { corners, well_formed }
    }

    /// Rebuilds the ring from wall quads, checking continuity
    ///
    /// Each wall's trailing floor corner must equal the next wall's leading
    /// floor corner exactly, and every leading floor corner must sit at height
    /// zero. Anything else marks the polygon as not well-formed.
    pub fn from_quads(quads: &[WallQuad]) -> Self {
        let count = quads.len();
        let mut corners = Vec::with_capacity(count);
        let mut well_formed = true;

        for (index, quad) in quads.iter().enumerate() {
            corners.push(quad.floor_start());
            let next = &quads[(index + 1) % count];
            if quad.floor_end() != next.floor_start() || quad.floor_start().y != 0.0 {
                well_formed = false;
            }
        }

        Self { corners, well_formed }
    }

    #[inline]
    pub fn wall_count(&self) -> usize {
        self.corners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    /// Safe to base comfort or safety decisions on
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.well_formed && !self.corners.is_empty()
    }

    pub fn corner(&self, index: usize) -> Option<Vec3> {
        self.corners.get(index).copied()
    }

    pub fn corners(&self) -> &[Vec3] {
        &self.corners
    }

    /// One sample per wall, in polygon order
    pub fn distances_to(&self, point: Vec3) -> Vec<BoundaryDistanceSample> {
        let count = self.corners.len();
        (0..count)
            .map(|index| self.wall_sample(index, (index + 1) % count, point))
            .collect()
    }

    /// Nearest wall; earliest wall wins ties and NaN never beats a real distance
    pub fn nearest(&self, point: Vec3) -> BoundaryDistanceSample {
        nearest_sample(&self.distances_to(point))
    }

    fn wall_sample(&self, index: usize, next: usize, point: Vec3) -> BoundaryDistanceSample {
        let r0 = self.corners[index];
        let r1 = self.corners[next];
        let p = point.horizontal();
        let a = r0.horizontal();
        let b = r1.horizontal();
        let u = b - a;
        let u_len_sq = u.length_sq();

        let nearest = if u_len_sq == 0.0 {
            // Zero-length wall, both corners coincide
            a
        } else {
            let r = (p - a).dot(u) / u_len_sq;
            if !(0.0..=1.0).contains(&r) {
                if p.distance_to(a) < p.distance_to(b) {
                    a
                } else {
                    b
                }
            } else {
                a + u * r
            }
        };

        BoundaryDistanceSample {
            distance: p.distance_to(nearest),
            nearest_point: Vec3::new(nearest.x, point.y, nearest.z),
            corners: [r0, r1],
            wall_index: index,
        }
    }
}

impl Default for BoundaryPolygon {
    fn default() -> Self {
        Self::empty()
    }
}

/// Minimum over `samples` with the polygon's tie-break and NaN rules
pub fn nearest_sample(samples: &[BoundaryDistanceSample]) -> BoundaryDistanceSample {
    let mut best: Option<&BoundaryDistanceSample> = None;
    for sample in samples {
        best = match best {
            None => Some(sample),
            Some(current) if current.distance.is_nan() && !sample.distance.is_nan() => Some(sample),
            Some(current) if sample.distance < current.distance => Some(sample),
            keep => keep,
        };
    }
    best.copied().unwrap_or_else(BoundaryDistanceSample::unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn square() -> BoundaryPolygon {
        BoundaryPolygon::from_corners(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, 4.0),
        ])
    }

    fn ring_quads(corners: &[Vec3]) -> Vec<WallQuad> {
        (0..corners.len())
            .map(|i| WallQuad::extrude(corners[i], corners[(i + 1) % corners.len()], 2.4))
            .collect()
    }

    #[test]
    fn test_projection_onto_wall() {
        let sample = square().nearest(Vec3::new(2.0, 0.0, -1.0));
        assert!((sample.distance - 1.0).abs() < EPSILON);
        assert!(sample.nearest_point.approx_eq(Vec3::new(2.0, 0.0, 0.0), EPSILON));
        assert_eq!(sample.wall_index, 0);
        assert_eq!(sample.corners, [Vec3::new(0.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_projection_outside_segment_uses_corner() {
        let sample = square().nearest(Vec3::new(-1.0, 0.0, -1.0));
        assert!((sample.distance - 2.0_f32.sqrt()).abs() < EPSILON);
        assert!(sample.nearest_point.approx_eq(Vec3::new(0.0, 0.0, 0.0), EPSILON));
    }

    #[test]
    fn test_height_is_ignored() {
        let low = square().nearest(Vec3::new(2.0, 0.0, 1.0));
        let high = square().nearest(Vec3::new(2.0, 1.8, 1.0));
        assert!((low.distance - high.distance).abs() < EPSILON);
        assert!((high.nearest_point.y - 1.8).abs() < EPSILON);
    }

    #[test]
    fn test_one_sample_per_wall_in_order() {
        let samples = square().distances_to(Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(samples.len(), 4);
        let expected = [2.0, 3.0, 2.0, 1.0];
        for (i, (sample, want)) in samples.iter().zip(expected).enumerate() {
            assert_eq!(sample.wall_index, i);
            assert!((sample.distance - want).abs() < EPSILON, "wall {}", i);
        }
    }

    #[test]
    fn test_tie_break_prefers_earlier_wall() {
        // Centre of the square is 2.0 from every wall
        let sample = square().nearest(Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(sample.wall_index, 0);

        // Equidistant from walls 1 and 2
        let sample = square().nearest(Vec3::new(3.0, 0.0, 3.0));
        assert_eq!(sample.wall_index, 1);
    }

    #[test]
    fn test_nan_never_wins() {
        let mut samples = square().distances_to(Vec3::new(1.0, 0.0, 2.0));
        samples[0].distance = f32::NAN;
        samples[3].distance = f32::NAN;
        let best = nearest_sample(&samples);
        assert_eq!(best.wall_index, 2);
        assert!((best.distance - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_all_nan_stays_nan() {
        let mut samples = square().distances_to(Vec3::ZERO);
        for s in &mut samples {
            s.distance = f32::NAN;
        }
        assert!(nearest_sample(&samples).distance.is_nan());
    }

    #[test]
    fn test_empty_polygon_yields_nan() {
        let polygon = BoundaryPolygon::empty();
        assert!(polygon.distances_to(Vec3::ZERO).is_empty());
        let sample = polygon.nearest(Vec3::ZERO);
        assert!(sample.distance.is_nan());
        assert!(!sample.is_available());
        assert!(!polygon.is_usable());
    }

    #[test]
    fn test_zero_length_wall() {
        let polygon = BoundaryPolygon::from_corners(vec![
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
        ]);
        let sample = polygon.nearest(Vec3::new(4.0, 0.0, 5.0));
        assert!((sample.distance - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_well_formed_ring_from_quads() {
        let polygon = BoundaryPolygon::from_quads(&ring_quads(square().corners()));
        assert!(polygon.is_well_formed());
        assert_eq!(polygon.wall_count(), 4);
        assert_eq!(polygon.corner(2), Some(Vec3::new(4.0, 0.0, 4.0)));
    }

    #[test]
    fn test_discontinuous_quads_not_well_formed() {
        let mut quads = ring_quads(square().corners());
        quads[1].corners[0] = Vec3::new(4.0, 0.0, 0.001);
        assert!(!BoundaryPolygon::from_quads(&quads).is_well_formed());
    }

    #[test]
    fn test_raised_corner_not_well_formed() {
        let corners: Vec<Vec3> = square().corners().iter().map(|c| c.with_y(0.1)).collect();
        let quads: Vec<WallQuad> = (0..4)
            .map(|i| WallQuad {
                corners: [corners[i], corners[i], corners[(i + 1) % 4], corners[(i + 1) % 4]],
            })
            .collect();
        let polygon = BoundaryPolygon::from_quads(&quads);
        assert!(!polygon.is_well_formed());
        assert!(!polygon.is_usable());
    }

    #[test]
    fn test_closest_corner() {
        let sample = square().nearest(Vec3::new(3.5, 0.0, -0.5));
        assert_eq!(sample.closest_corner(Vec3::new(3.5, 0.0, -0.5)), Vec3::new(4.0, 0.0, 0.0));
        assert!(sample.wall_direction().approx_eq(Vec2::new(1.0, 0.0), EPSILON));
    }
}
