//! Automatic turning near the boundary
//!
//! A wall arms when the user is within the activation distance and looking
//! towards it. The turn brings the view parallel to the wall, or, with corner
//! angle enabled and the neighbouring wall also close, away from the corner.
//! Snap mode turns by the configured snap angle in that direction.
//! An armed wall cannot trigger again until the user is further from it than
//! the activation distance plus the deactivation distance.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::chaperone::{BoundaryDistanceSample, BoundaryPolygon};
use crate::config::{AutoTurnMode, ComfortConfig};
use crate::tracking::Pose;
use crate::util::angle::circular_index;
use crate::util::vec2::Vec2;

/// Result of one auto-turn tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AutoTurnStep {
    /// Rotation to apply this tick, radians from +X towards +Z
    pub rotation: f32,
    /// Wall that armed this tick
    pub triggered_wall: Option<usize>,
}

pub struct AutoTurn {
    mode: AutoTurnMode,
    activation_distance: f32,
    /// Distance past which an armed wall re-arms
    rearm_distance: f32,
    /// Radians
    snap_angle: f32,
    use_corner_angle: bool,
    /// Radians per second
    speed: f32,
    wall_active: SmallVec<[bool; 8]>,
    /// Smooth turn still to apply
    remaining: f32,
    polygon: Option<Arc<BoundaryPolygon>>,
}

impl AutoTurn {
    pub fn new(config: &ComfortConfig) -> Self {
        Self {
            mode: config.auto_turn_mode,
            activation_distance: config.auto_turn_activation_distance,
            rearm_distance: config.auto_turn_activation_distance + config.auto_turn_deactivation_distance.max(0.0),
            snap_angle: config.auto_turn_snap_angle.to_radians(),
            use_corner_angle: config.auto_turn_use_corner_angle,
            speed: config.auto_turn_speed.to_radians(),
            wall_active: SmallVec::new(),
            remaining: 0.0,
            polygon: None,
        }
    }

    pub fn reset(&mut self) {
        self.wall_active.clear();
        self.remaining = 0.0;
        self.polygon = None;
    }

    pub fn is_turning(&self) -> bool {
        self.remaining != 0.0
    }

    pub fn is_wall_active(&self, wall: usize) -> bool {
        self.wall_active.get(wall).copied().unwrap_or(false)
    }

    pub fn update(&mut self, polygon: &Arc<BoundaryPolygon>, pose: &Pose, dt: f32) -> AutoTurnStep {
        if !polygon.is_usable() {
            self.reset();
            return AutoTurnStep::default();
        }
        if !self.polygon.as_ref().is_some_and(|p| Arc::ptr_eq(p, polygon)) {
            self.wall_active = SmallVec::from_elem(false, polygon.wall_count());
            self.remaining = 0.0;
            self.polygon = Some(polygon.clone());
        }

        let head = pose.translation();
        let heading = pose.heading();
        let samples = polygon.distances_to(head);

        for (active, sample) in self.wall_active.iter_mut().zip(&samples) {
            if *active && sample.distance > self.rearm_distance {
                *active = false;
            }
        }

        let mut step = AutoTurnStep::default();
        if !heading.is_zero(f32::EPSILON) {
            if let Some(wall) = self.pick_wall(&samples, heading, head.horizontal()) {
                let turn = self.turn_for(&samples, wall, heading, head.horizontal());
                self.wall_active[wall] = true;
                debug!("Auto-turn armed by wall {} ({:.3} m), turning {:.3} rad", wall, samples[wall].distance, turn);
                step.triggered_wall = Some(wall);
                match self.mode {
                    AutoTurnMode::Snap => {
                        self.remaining = 0.0;
                        if turn != 0.0 {
                            step.rotation = self.snap_angle.copysign(turn);
                        }
                        return step;
                    }
                    AutoTurnMode::LinearSmooth => self.remaining = turn,
                }
            }
        }

        if self.remaining != 0.0 {
            let max_step = self.speed * dt.max(0.0);
            let applied = self.remaining.clamp(-max_step, max_step);
            self.remaining -= applied;
            if self.remaining.abs() < f32::EPSILON {
                self.remaining = 0.0;
            }
            step.rotation = applied;
        }
        step
    }

    /// Nearest unarmed wall within reach that the user is looking towards
    fn pick_wall(&self, samples: &[BoundaryDistanceSample], heading: Vec2, head: Vec2) -> Option<usize> {
        samples
            .iter()
            .filter(|s| !self.wall_active[s.wall_index])
            .filter(|s| s.distance <= self.activation_distance)
            .filter(|s| (s.nearest_point.horizontal() - head).dot(heading) > 0.0)
            .fold(None, |best: Option<&BoundaryDistanceSample>, s| match best {
                Some(b) if b.distance <= s.distance => Some(b),
                _ => Some(s),
            })
            .map(|s| s.wall_index)
    }

    fn turn_for(&mut self, samples: &[BoundaryDistanceSample], wall: usize, heading: Vec2, head: Vec2) -> f32 {
        let sample = &samples[wall];

        if self.use_corner_angle {
            let corner = sample.closest_corner(sample.nearest_point);
            let towards_start = corner == sample.corners[0];
            let neighbour = circular_index(wall, !towards_start, samples.len());
            if neighbour != wall && samples[neighbour].distance <= self.activation_distance {
                let away = (head - corner.horizontal()).normalize();
                if !away.is_zero(f32::EPSILON) {
                    self.wall_active[neighbour] = true;
                    return heading.angle_to(away);
                }
            }
        }

        let along = sample.wall_direction();
        let forward = heading.angle_to(along);
        let backward = heading.angle_to(-along);
        if forward.abs() <= backward.abs() {
            forward
        } else {
            backward
        }
    }
}
