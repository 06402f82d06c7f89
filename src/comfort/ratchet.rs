//! View ratchetting
//!
//! While the user turns away from the nearest wall, every time the turn since
//! the last ratchet point exceeds the configured fraction of the angle that
//! separated the view from the wall at that point, an extra step of that
//! fraction of the turn is applied. The reference is kept per wall so that
//! steps stay consistent while the same wall remains the nearest.

use crate::chaperone::BoundaryPolygon;
use crate::config::ComfortConfig;
use crate::constants::comfort::MIN_ROTATION;
use crate::tracking::Pose;
use crate::util::angle::wrap_pi;

/// Heading and wall at the last ratchet point
#[derive(Debug, Clone, Copy, PartialEq)]
struct RatchetPoint {
    wall: usize,
    yaw: f32,
    /// Signed angle from the view to the wall at this point
    wall_angle: f32,
}

pub struct ViewRatchet {
    percent: f32,
    last: Option<RatchetPoint>,
}

impl ViewRatchet {
    pub fn new(config: &ComfortConfig) -> Self {
        Self {
            percent: config.ratchet_percent,
            last: None,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Wall the current reference belongs to
    pub fn last_wall(&self) -> Option<usize> {
        self.last.map(|p| p.wall)
    }

    /// Step rotation for this tick, radians from +X towards +Z
    pub fn update(&mut self, polygon: &BoundaryPolygon, pose: &Pose) -> f32 {
        if !polygon.is_usable() {
            self.reset();
            return 0.0;
        }

        let heading = pose.heading();
        if heading.is_zero(f32::EPSILON) {
            return 0.0;
        }

        let head = pose.translation();
        let nearest = polygon.nearest(head);
        if !nearest.is_available() {
            return 0.0;
        }
        let to_wall = (nearest.nearest_point.horizontal() - head.horizontal()).normalize();
        if to_wall.is_zero(f32::EPSILON) {
            return 0.0;
        }

        let yaw = heading.angle();
        let point = RatchetPoint {
            wall: nearest.wall_index,
            yaw,
            wall_angle: heading.angle_to(to_wall),
        };

        let Some(last) = self.last.filter(|p| p.wall == nearest.wall_index) else {
            self.last = Some(point);
            return 0.0;
        };

        let turned = wrap_pi(yaw - last.yaw);
        // Away from the wall means opposite in sign to the angle towards it
        let turning_away = turned * last.wall_angle < 0.0;
        if !turning_away || turned.abs() < self.percent * last.wall_angle.abs() {
            return 0.0;
        }

        let step = self.percent * turned;
        if step.abs() < MIN_ROTATION {
            return 0.0;
        }
        self.last = Some(point);
        step
    }
}
