//! Vestibular motion cue
//!
//! Inside the configured radius of the nearest wall, head movement along the
//! wall produces a small yaw, scaled by how close the wall is.

use crate::chaperone::BoundaryPolygon;
use crate::config::ComfortConfig;
use crate::tracking::Pose;
use crate::util::vec2::Vec2;

pub struct VestibularMotion {
    radius: f32,
    last_head: Option<Vec2>,
}

impl VestibularMotion {
    pub fn new(config: &ComfortConfig) -> Self {
        Self {
            radius: config.vestibular_radius,
            last_head: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_head = None;
    }

    /// Yaw for this tick, radians from +X towards +Z
    pub fn update(&mut self, polygon: &BoundaryPolygon, pose: &Pose) -> f32 {
        if !polygon.is_usable() || !(self.radius > 0.0) {
            self.reset();
            return 0.0;
        }

        let head = pose.translation();
        let current = head.horizontal();
        let previous = self.last_head.replace(current);

        let nearest = polygon.nearest(head);
        if !(nearest.distance < self.radius) {
            return 0.0;
        }
        let Some(previous) = previous else {
            return 0.0;
        };

        let proximity = 1.0 - nearest.distance / self.radius;
        let along = (current - previous).dot(nearest.wall_direction());
        proximity * along / self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comfort::test_support::{pose_facing, square_polygon};

    fn motion() -> VestibularMotion {
        VestibularMotion::new(&ComfortConfig {
            vestibular_radius: 0.5,
            ..ComfortConfig::default()
        })
    }

    #[test]
    fn test_no_cue_outside_radius() {
        let polygon = square_polygon();
        let mut motion = motion();
        motion.update(&polygon, &pose_facing(2.0, 2.0, 0.0));
        assert_eq!(motion.update(&polygon, &pose_facing(2.1, 2.0, 0.0)), 0.0);
    }

    #[test]
    fn test_first_tick_has_no_reference() {
        let polygon = square_polygon();
        let mut motion = motion();
        assert_eq!(motion.update(&polygon, &pose_facing(2.0, 0.1, 0.0)), 0.0);
    }

    #[test]
    fn test_cue_scales_with_proximity() {
        let polygon = square_polygon();

        // Wall 0 runs along +X; move 0.1 m along it
        let mut near = motion();
        near.update(&polygon, &pose_facing(2.0, 0.1, 0.0));
        let near_yaw = near.update(&polygon, &pose_facing(2.1, 0.1, 0.0));

        let mut far = motion();
        far.update(&polygon, &pose_facing(2.0, 0.4, 0.0));
        let far_yaw = far.update(&polygon, &pose_facing(2.1, 0.4, 0.0));

        // (1 - 0.1 / 0.5) * 0.1 / 0.5
        assert!((near_yaw - 0.16).abs() < 1e-4, "{}", near_yaw);
        assert!(far_yaw > 0.0 && far_yaw < near_yaw);
    }

    #[test]
    fn test_direction_follows_movement() {
        let polygon = square_polygon();
        let mut motion = motion();
        motion.update(&polygon, &pose_facing(2.0, 0.1, 0.0));
        assert!(motion.update(&polygon, &pose_facing(1.9, 0.1, 0.0)) < 0.0);
    }

    #[test]
    fn test_moving_straight_at_wall_gives_no_cue() {
        let polygon = square_polygon();
        let mut motion = motion();
        motion.update(&polygon, &pose_facing(2.0, 0.3, 0.0));
        assert!(motion.update(&polygon, &pose_facing(2.0, 0.2, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn test_unusable_polygon() {
        let mut motion = motion();
        let empty = BoundaryPolygon::empty();
        motion.update(&empty, &pose_facing(0.0, 0.0, 0.0));
        assert_eq!(motion.update(&empty, &pose_facing(0.1, 0.0, 0.0)), 0.0);
    }
}
