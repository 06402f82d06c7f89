//! Boundary frame processing
//!
//! Turns one decoded frame into a committed boundary: reset handling, pose
//! validation, head-to-world transform, wall extrusion and the runtime
//! revert/set/commit sequence.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::wire::BoundaryWireFrame;
use crate::chaperone::{BoundaryDistanceEngine, BoundaryEvent, BoundaryNotifier};
use crate::constants::geometry::{RECOMMIT_THRESHOLD, WALL_HEIGHT};
use crate::constants::protocol::FRAME_CORNER_COUNT;
use crate::metrics::Metrics;
use crate::tracking::{BoundsSource, Pose, SharedRuntime, WallQuad};
use crate::util::vec3::Vec3;

/// What a frame did to the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Unavailable sentinel; pending edits reverted
    Reset,
    /// Head pose not valid this tick
    DroppedInvalidPose,
    /// Transformed corners were not finite
    DroppedNonFinite,
    /// Same boundary as the last commit
    Debounced,
    /// New live boundary
    Committed { wall_count: usize },
    /// The runtime refused the commit
    CommitFailed,
}

/// Last committed boundary, for redundant-commit suppression
#[derive(Debug, Clone, Copy)]
struct CommittedBoundary {
    play_area: (f32, f32),
    corners: [Vec3; FRAME_CORNER_COUNT],
}

impl CommittedBoundary {
    fn is_close_to(&self, play_area: (f32, f32), corners: &[Vec3; FRAME_CORNER_COUNT], threshold: f32) -> bool {
        if self.play_area != play_area {
            return false;
        }
        let max_movement = self
            .corners
            .iter()
            .zip(corners.iter())
            .map(|(a, b)| a.horizontal_distance_to(*b))
            .fold(0.0f32, f32::max);
        max_movement < threshold
    }
}

/// Applies frames from one peer, strictly in order
pub struct FrameProcessor {
    runtime: SharedRuntime,
    engine: Arc<BoundaryDistanceEngine>,
    notifier: BoundaryNotifier,
    metrics: Arc<Metrics>,
    wall_height: f32,
    recommit_threshold: f32,
    last_commit: Option<CommittedBoundary>,
}

impl FrameProcessor {
    pub fn new(
        runtime: SharedRuntime,
        engine: Arc<BoundaryDistanceEngine>,
        notifier: BoundaryNotifier,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runtime,
            engine,
            notifier,
            metrics,
            wall_height: WALL_HEIGHT,
            recommit_threshold: RECOMMIT_THRESHOLD,
            last_commit: None,
        }
    }

    pub fn with_wall_height(mut self, wall_height: f32) -> Self {
        self.wall_height = wall_height;
        self
    }

    /// Corner movement below `threshold` is not re-committed; 0 commits every frame
    pub fn with_recommit_threshold(mut self, threshold: f32) -> Self {
        self.recommit_threshold = threshold;
        self
    }

    pub fn process_frame(&mut self, frame: &BoundaryWireFrame) -> FrameOutcome {
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

        if frame.is_unavailable() {
            return self.reset();
        }

        let mut runtime = self.runtime.lock();

        let hmd = runtime.hmd_pose();
        let Some(pose) = hmd.usable() else {
            debug!("Head pose invalid, boundary frame dropped");
            self.metrics.frames_invalid_pose.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::DroppedInvalidPose;
        };

        let corners = world_corners(pose, &frame.corners);
        if !corners.iter().all(Vec3::is_finite) {
            debug!("Boundary frame produced non-finite corners, dropped");
            self.metrics.frames_malformed.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::DroppedNonFinite;
        }

        let play_area = (frame.play_area_x, frame.play_area_z);
        if let Some(last) = &self.last_commit {
            if last.is_close_to(play_area, &corners, self.recommit_threshold) {
                self.metrics.frames_debounced.fetch_add(1, Ordering::Relaxed);
                return FrameOutcome::Debounced;
            }
        }

        let quads = extrude_walls(&corners, self.wall_height);

        // One uninterrupted sequence under the runtime guard
        runtime.revert_working_copy();
        runtime.set_working_play_area_size(play_area.0, play_area.1);
        runtime.set_working_collision_bounds(&quads);
        runtime.set_working_standing_zero_pose(&Pose::IDENTITY);
        runtime.set_working_seated_zero_pose(&Pose::IDENTITY);

        if let Err(e) = runtime.commit_working_copy() {
            warn!("Boundary commit failed: {}", e);
            runtime.revert_working_copy();
            self.metrics.commit_failures.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::CommitFailed;
        }

        if let Err(e) = self.engine.load_from(&*runtime, BoundsSource::Live) {
            warn!("Failed to reload boundary after commit: {}", e);
        }
        drop(runtime);

        self.last_commit = Some(CommittedBoundary { play_area, corners });
        self.metrics.boundary_commits.fetch_add(1, Ordering::Relaxed);
        self.notifier.notify(BoundaryEvent::Committed {
            wall_count: quads.len(),
            play_area,
        });
        info!(
            "Committed boundary: {} walls, play area {:.2} x {:.2}",
            quads.len(),
            play_area.0,
            play_area.1
        );

        FrameOutcome::Committed { wall_count: quads.len() }
    }

    fn reset(&mut self) -> FrameOutcome {
        info!("Peer reports no boundary, reverting pending edits");
        self.runtime.lock().revert_working_copy();
        self.last_commit = None;
        self.metrics.boundary_resets.fetch_add(1, Ordering::Relaxed);
        self.notifier.notify(BoundaryEvent::Reset);
        FrameOutcome::Reset
    }
}

/// Head-relative corners to world space, flattened to the floor
pub fn world_corners(pose: &Pose, local: &[Vec3; FRAME_CORNER_COUNT]) -> [Vec3; FRAME_CORNER_COUNT] {
    local.map(|corner| pose.transform_point(corner).with_y(0.0))
}

/// One wall per corner and its cyclic successor, same winding for all
pub fn extrude_walls(corners: &[Vec3], height: f32) -> Vec<WallQuad> {
    let n = corners.len();
    (0..n)
        .map(|i| WallQuad::extrude(corners[i], corners[(i + 1) % n], height))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaperone::BoundaryPolygon;
    use crate::tracking::simulated::RuntimeOp;
    use crate::tracking::{DevicePose, SimulatedRuntime};
    use parking_lot::Mutex;
    use std::f32::consts::FRAC_PI_2;

    struct Harness {
        sim: Arc<Mutex<SimulatedRuntime>>,
        engine: Arc<BoundaryDistanceEngine>,
        events: crossbeam_channel::Receiver<BoundaryEvent>,
        metrics: Arc<Metrics>,
        processor: FrameProcessor,
    }

    fn harness() -> Harness {
        let sim = Arc::new(Mutex::new(SimulatedRuntime::new()));
        let runtime: SharedRuntime = sim.clone();
        let engine = Arc::new(BoundaryDistanceEngine::new());
        let (notifier, events) = BoundaryNotifier::channel();
        let metrics = Arc::new(Metrics::new());
        let processor = FrameProcessor::new(runtime, engine.clone(), notifier, metrics.clone());
        Harness {
            sim,
            engine,
            events,
            metrics,
            processor,
        }
    }

    /// 4 x 4 square in front of the head, y = -1.6 (floor below eye level)
    fn square_frame() -> BoundaryWireFrame {
        BoundaryWireFrame::new(
            4.0,
            4.0,
            [
                Vec3::new(-2.0, -1.6, -2.0),
                Vec3::new(2.0, -1.6, -2.0),
                Vec3::new(2.0, -1.6, 2.0),
                Vec3::new(-2.0, -1.6, 2.0),
            ],
        )
    }

    #[test]
    fn test_commit_sequence() {
        let mut h = harness();
        let outcome = h.processor.process_frame(&square_frame());
        assert_eq!(outcome, FrameOutcome::Committed { wall_count: 4 });

        let sim = h.sim.lock();
        assert_eq!(
            sim.journal(),
            &[
                RuntimeOp::Revert,
                RuntimeOp::SetPlayArea { size_x: 4.0, size_z: 4.0 },
                RuntimeOp::SetCollisionBounds { quad_count: 4 },
                RuntimeOp::SetStandingZeroPose,
                RuntimeOp::SetSeatedZeroPose,
                RuntimeOp::Commit,
            ]
        );
        assert_eq!(sim.live().standing_zero_pose, Some(Pose::IDENTITY));
        assert_eq!(sim.live().seated_zero_pose, Some(Pose::IDENTITY));
        assert_eq!(sim.live().play_area, (4.0, 4.0));
    }

    #[test]
    fn test_committed_geometry_is_flat_and_well_formed() {
        let mut h = harness();
        h.processor.process_frame(&square_frame());

        let quads = h.sim.lock().live().quads.clone();
        for quad in &quads {
            assert_eq!(quad.floor_start().y, 0.0);
            assert_eq!(quad.floor_end().y, 0.0);
            assert!((quad.corners[1].y - WALL_HEIGHT).abs() < 1e-6);
        }
        assert!(BoundaryPolygon::from_quads(&quads).is_well_formed());
        assert!(h.engine.is_chaperone_well_formed());
        assert_eq!(h.engine.quads_count(), 4);
    }

    #[test]
    fn test_corners_follow_head_pose() {
        let mut h = harness();
        // Head at (10, 1.6, 0) turned a quarter turn
        h.sim.lock().set_hmd_pose(DevicePose::valid(Pose::from_yaw_translation(
            FRAC_PI_2,
            Vec3::new(10.0, 1.6, 0.0),
        )));
        h.processor.process_frame(&square_frame());

        // Local (-2, -1.6, -2) rotates to (-2, *, 2) then shifts by x = 10
        let first = h.engine.corner(0).unwrap();
        assert!(first.approx_eq(Vec3::new(8.0, 0.0, 2.0), 1e-4), "{:?}", first);

        let sample = h.engine.distance_to_chaperone(Vec3::new(10.0, 1.6, 0.0));
        assert!((sample.distance - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_tilted_head_still_flat() {
        let mut h = harness();
        // Rows of a pitch rotation: the transformed y varies per corner
        let pitch = 0.3f32;
        let (s, c) = (pitch.sin(), pitch.cos());
        h.sim.lock().set_hmd_pose(DevicePose::valid(Pose::from_row_major([
            1.0, 0.0, 0.0, 0.0, //
            0.0, c, -s, 1.7, //
            0.0, s, c, 0.0,
        ])));
        h.processor.process_frame(&square_frame());

        for quad in &h.sim.lock().live().quads {
            assert_eq!(quad.corners[0].y, 0.0);
            assert_eq!(quad.corners[3].y, 0.0);
        }
    }

    #[test]
    fn test_unavailable_frame_resets() {
        let mut h = harness();
        h.processor.process_frame(&square_frame());
        h.sim.lock().clear_journal();
        let _ = h.events.try_iter().count();

        let outcome = h.processor.process_frame(&BoundaryWireFrame::unavailable());
        assert_eq!(outcome, FrameOutcome::Reset);
        assert_eq!(h.sim.lock().journal(), &[RuntimeOp::Revert]);
        assert_eq!(h.events.try_recv().ok(), Some(BoundaryEvent::Reset));
        assert_eq!(h.metrics.boundary_resets.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_negative_extent_resets() {
        let mut h = harness();
        let mut frame = square_frame();
        frame.play_area_z = -1.0;
        assert_eq!(h.processor.process_frame(&frame), FrameOutcome::Reset);
        assert_eq!(h.sim.lock().commit_count(), 0);
    }

    #[test]
    fn test_invalid_pose_drops_frame() {
        let mut h = harness();
        h.sim.lock().set_hmd_pose(DevicePose::invalid());

        let outcome = h.processor.process_frame(&square_frame());
        assert_eq!(outcome, FrameOutcome::DroppedInvalidPose);
        assert!(h.sim.lock().journal().is_empty());
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.metrics.frames_invalid_pose.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_non_finite_pose_drops_frame() {
        let mut h = harness();
        let mut pose = Pose::IDENTITY;
        pose.m[0][3] = f32::NAN;
        h.sim.lock().set_hmd_pose(DevicePose::valid(pose));
        assert_eq!(h.processor.process_frame(&square_frame()), FrameOutcome::DroppedInvalidPose);
    }

    #[test]
    fn test_repeated_frame_debounced() {
        let mut h = harness();
        h.processor.process_frame(&square_frame());

        let mut jittered = square_frame();
        jittered.corners[2].x += 0.001;
        assert_eq!(h.processor.process_frame(&jittered), FrameOutcome::Debounced);
        assert_eq!(h.sim.lock().commit_count(), 1);

        let mut moved = square_frame();
        moved.corners[2].x += 0.5;
        assert_eq!(h.processor.process_frame(&moved), FrameOutcome::Committed { wall_count: 4 });
        assert_eq!(h.sim.lock().commit_count(), 2);
    }

    #[test]
    fn test_reset_clears_debounce() {
        let mut h = harness();
        h.processor.process_frame(&square_frame());
        h.processor.process_frame(&BoundaryWireFrame::unavailable());
        assert_eq!(
            h.processor.process_frame(&square_frame()),
            FrameOutcome::Committed { wall_count: 4 }
        );
    }

    #[test]
    fn test_zero_threshold_always_commits() {
        let mut h = harness();
        h.processor = FrameProcessor::new(
            h.sim.clone(),
            h.engine.clone(),
            BoundaryNotifier::detached(),
            h.metrics.clone(),
        )
        .with_recommit_threshold(0.0);

        h.processor.process_frame(&square_frame());
        h.processor.process_frame(&square_frame());
        assert_eq!(h.sim.lock().commit_count(), 2);
    }

    #[test]
    fn test_commit_rejected() {
        let mut h = harness();
        h.sim.lock().set_reject_commits(true);

        assert_eq!(h.processor.process_frame(&square_frame()), FrameOutcome::CommitFailed);
        assert!(h.sim.lock().live().quads.is_empty());
        assert_eq!(h.engine.quads_count(), 0);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_committed_event() {
        let mut h = harness();
        h.processor.process_frame(&square_frame());
        assert_eq!(
            h.events.try_recv().ok(),
            Some(BoundaryEvent::Committed {
                wall_count: 4,
                play_area: (4.0, 4.0)
            })
        );
    }

    #[test]
    fn test_custom_wall_height() {
        let mut h = harness();
        h.processor = FrameProcessor::new(
            h.sim.clone(),
            h.engine.clone(),
            BoundaryNotifier::detached(),
            h.metrics.clone(),
        )
        .with_wall_height(3.0);
        h.processor.process_frame(&square_frame());
        assert!((h.sim.lock().live().quads[0].corners[1].y - 3.0).abs() < 1e-6);
    }
}
