//! Tracking runtime collaborator
//!
//! The sync server and the distance engine talk to the headset runtime only
//! through [`TrackingRuntime`]. A runtime is a single logical object without
//! concurrency guarantees of its own, so it is always shared as
//! [`SharedRuntime`] and every multi-step edit runs under one lock guard.

pub mod simulated;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;
use crate::util::vec3::Vec3;

pub use simulated::SimulatedRuntime;

/// Runtime handle shared between the sync server, the engine and the comfort tick
pub type SharedRuntime = Arc<Mutex<dyn TrackingRuntime>>;

/// Rigid 3x4 row-major transform (rotation | translation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub m: [[f32; 4]; 3],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    /// Builds a pose from 12 row-major floats
    pub fn from_row_major(values: [f32; 12]) -> Self {
        let mut m = [[0.0; 4]; 3];
        for (i, value) in values.into_iter().enumerate() {
            m[i / 4][i % 4] = value;
        }
        Self { m }
    }

    /// Pure yaw rotation (about +Y) followed by a translation
    pub fn from_yaw_translation(yaw: f32, translation: Vec3) -> Self {
        let (sin, cos) = (yaw.sin(), yaw.cos());
        Self {
            m: [
                [cos, 0.0, sin, translation.x],
                [0.0, 1.0, 0.0, translation.y],
                [-sin, 0.0, cos, translation.z],
            ],
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    /// Rotation part applied to a direction
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// `world = R * local + T`
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.rotate(local) + self.translation()
    }

    /// Viewing direction (-Z of the device) projected on the floor
    ///
    /// Zero when the device looks straight up or down.
    pub fn heading(&self) -> Vec2 {
        let forward = self.rotate(Vec3::new(0.0, 0.0, -1.0));
        forward.horizontal().normalize()
    }

    pub fn is_finite(&self) -> bool {
        self.m.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Head pose snapshot as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePose {
    pub device_to_absolute: Pose,
    pub pose_is_valid: bool,
}

impl DevicePose {
    pub fn valid(pose: Pose) -> Self {
        Self {
            device_to_absolute: pose,
            pose_is_valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            device_to_absolute: Pose::IDENTITY,
            pose_is_valid: false,
        }
    }

    /// The pose, if tracking currently trusts it
    pub fn usable(&self) -> Option<&Pose> {
        (self.pose_is_valid && self.device_to_absolute.is_finite()).then_some(&self.device_to_absolute)
    }
}

/// One vertical wall of the collision boundary
///
/// Corner order is `[floor_start, top_start, top_end, floor_end]` for every
/// wall, so a closed ring satisfies `quad[i].corners[3] == quad[i + 1].corners[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallQuad {
    pub corners: [Vec3; 4],
}

impl WallQuad {
    /// Extrudes the floor edge `start -> end` up to `height`
    pub fn extrude(start: Vec3, end: Vec3, height: f32) -> Self {
        let start = start.with_y(0.0);
        let end = end.with_y(0.0);
        Self {
            corners: [start, start.with_y(height), end.with_y(height), end],
        }
    }

    #[inline]
    pub fn floor_start(&self) -> Vec3 {
        self.corners[0]
    }

    #[inline]
    pub fn floor_end(&self) -> Vec3 {
        self.corners[3]
    }
}

/// Which copy of the boundary to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsSource {
    /// Committed and enforced
    Live,
    /// Pending, not yet committed
    Working,
}

/// Errors reported by the tracking runtime
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("Tracking runtime unavailable")]
    Unavailable,
    #[error("Commit rejected: {0}")]
    CommitRejected(String),
}

/// Boundary-related surface of the headset runtime
///
/// Methods are synchronous and not safe to interleave; callers serialise a
/// revert/set/commit sequence under one [`SharedRuntime`] guard.
pub trait TrackingRuntime: Send {
    /// Current head-to-world transform of the primary tracked device
    fn hmd_pose(&self) -> DevicePose;

    /// Wall quads of the committed or pending boundary
    fn collision_bounds(&self, source: BoundsSource) -> Result<Vec<WallQuad>, RuntimeError>;

    fn revert_working_copy(&mut self);

    fn set_working_play_area_size(&mut self, size_x: f32, size_z: f32);

    fn set_working_collision_bounds(&mut self, quads: &[WallQuad]);

    fn set_working_standing_zero_pose(&mut self, pose: &Pose);

    fn set_working_seated_zero_pose(&mut self, pose: &Pose);

    /// Promotes the working copy to the live boundary
    fn commit_working_copy(&mut self) -> Result<(), RuntimeError>;
}
