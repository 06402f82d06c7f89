//! In-memory tracking runtime
//!
//! Keeps a working and a live boundary copy with the same revert/commit
//! semantics as a headset runtime, plus a journal of the most recent mutations
//! so callers can inspect the exact sequence that was issued.

use std::collections::VecDeque;

use super::{BoundsSource, DevicePose, Pose, RuntimeError, TrackingRuntime, WallQuad};

/// One boundary copy (working or live)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryCopy {
    pub play_area: (f32, f32),
    pub quads: Vec<WallQuad>,
    pub standing_zero_pose: Option<Pose>,
    pub seated_zero_pose: Option<Pose>,
}

/// Journal entry for one runtime mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeOp {
    Revert,
    SetPlayArea { size_x: f32, size_z: f32 },
    SetCollisionBounds { quad_count: usize },
    SetStandingZeroPose,
    SetSeatedZeroPose,
    Commit,
}

/// Journal entries kept; older ones are dropped
pub const JOURNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SimulatedRuntime {
    hmd: DevicePose,
    working: BoundaryCopy,
    live: BoundaryCopy,
    journal: VecDeque<RuntimeOp>,
    commits: usize,
    reject_commits: bool,
}

impl SimulatedRuntime {
    /// Runtime with an identity head pose and no boundary
    pub fn new() -> Self {
        Self {
            hmd: DevicePose::valid(Pose::IDENTITY),
            working: BoundaryCopy::default(),
            live: BoundaryCopy::default(),
            journal: VecDeque::with_capacity(JOURNAL_CAPACITY),
            commits: 0,
            reject_commits: false,
        }
    }

    /// Runtime whose live (and working) boundary is `quads`
    pub fn with_live_bounds(quads: Vec<WallQuad>) -> Self {
        let mut runtime = Self::new();
        runtime.live.quads = quads;
        runtime.working = runtime.live.clone();
        runtime
    }

    pub fn set_hmd_pose(&mut self, pose: DevicePose) {
        self.hmd = pose;
    }

    /// Makes subsequent commits fail
    pub fn set_reject_commits(&mut self, reject: bool) {
        self.reject_commits = reject;
    }

    pub fn live(&self) -> &BoundaryCopy {
        &self.live
    }

    pub fn working(&self) -> &BoundaryCopy {
        &self.working
    }

    /// Most recent mutations, oldest first
    pub fn journal(&self) -> Vec<RuntimeOp> {
        self.journal.iter().copied().collect()
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Successful commits since creation
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    fn record(&mut self, op: RuntimeOp) {
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.pop_front();
        }
        self.journal.push_back(op);
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingRuntime for SimulatedRuntime {
    fn hmd_pose(&self) -> DevicePose {
        self.hmd
    }

    fn collision_bounds(&self, source: BoundsSource) -> Result<Vec<WallQuad>, RuntimeError> {
        let copy = match source {
            BoundsSource::Live => &self.live,
            BoundsSource::Working => &self.working,
        };
        Ok(copy.quads.clone())
    }

    fn revert_working_copy(&mut self) {
        self.working = self.live.clone();
        self.record(RuntimeOp::Revert);
    }

    fn set_working_play_area_size(&mut self, size_x: f32, size_z: f32) {
        self.working.play_area = (size_x, size_z);
        self.record(RuntimeOp::SetPlayArea { size_x, size_z });
    }

    fn set_working_collision_bounds(&mut self, quads: &[WallQuad]) {
        self.working.quads = quads.to_vec();
        self.record(RuntimeOp::SetCollisionBounds {
            quad_count: quads.len(),
        });
    }

    fn set_working_standing_zero_pose(&mut self, pose: &Pose) {
        self.working.standing_zero_pose = Some(*pose);
        self.record(RuntimeOp::SetStandingZeroPose);
    }

    fn set_working_seated_zero_pose(&mut self, pose: &Pose) {
        self.working.seated_zero_pose = Some(*pose);
        self.record(RuntimeOp::SetSeatedZeroPose);
    }

    fn commit_working_copy(&mut self) -> Result<(), RuntimeError> {
        if self.reject_commits {
            return Err(RuntimeError::CommitRejected("simulated rejection".to_string()));
        }
        self.live = self.working.clone();
        self.commits += 1;
        self.record(RuntimeOp::Commit);
        Ok(())
    }
}
