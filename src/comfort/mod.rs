//! Comfort consumers driven from the render tick
//!
//! Each tick takes one polygon snapshot from the distance engine and runs the
//! enabled consumers against it. Nothing here touches the network; an
//! unusable boundary or an untracked head simply produces no rotation.

pub mod auto_turn;
pub mod ratchet;
pub mod vestibular;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::chaperone::BoundaryDistanceEngine;
use crate::config::ComfortConfig;
use crate::constants::comfort::MIN_ROTATION;
use crate::metrics::Metrics;
use crate::tracking::DevicePose;

pub use auto_turn::{AutoTurn, AutoTurnStep};
pub use ratchet::ViewRatchet;
pub use vestibular::VestibularMotion;

/// Rotations requested by one tick, radians from +X towards +Z
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComfortOutput {
    pub auto_turn: f32,
    pub vestibular: f32,
    pub ratchet: f32,
}

impl ComfortOutput {
    pub fn total(&self) -> f32 {
        self.auto_turn + self.vestibular + self.ratchet
    }

    pub fn is_idle(&self) -> bool {
        self.total().abs() < MIN_ROTATION
    }
}

pub struct ComfortController {
    engine: Arc<BoundaryDistanceEngine>,
    auto_turn: Option<AutoTurn>,
    vestibular: Option<VestibularMotion>,
    ratchet: Option<ViewRatchet>,
    metrics: Option<Arc<Metrics>>,
}

impl ComfortController {
    pub fn new(config: &ComfortConfig, engine: Arc<BoundaryDistanceEngine>) -> Self {
        Self {
            engine,
            auto_turn: config.auto_turn_enabled.then(|| AutoTurn::new(config)),
            vestibular: config.vestibular_enabled.then(|| VestibularMotion::new(config)),
            ratchet: config.ratchet_enabled.then(|| ViewRatchet::new(config)),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn tick(&mut self, hmd: &DevicePose, dt: Duration) -> ComfortOutput {
        let started = Instant::now();
        let output = self.evaluate(hmd, dt.as_secs_f32());
        if let Some(metrics) = &self.metrics {
            metrics.record_tick_time(started.elapsed());
        }
        output
    }

    fn evaluate(&mut self, hmd: &DevicePose, dt: f32) -> ComfortOutput {
        let mut output = ComfortOutput::default();
        let Some(pose) = hmd.usable() else {
            return output;
        };
        let polygon = self.engine.snapshot();

        if let Some(auto_turn) = &mut self.auto_turn {
            let step = auto_turn.update(&polygon, pose, dt);
            if step.triggered_wall.is_some() {
                if let Some(metrics) = &self.metrics {
                    metrics.auto_turn_activations.fetch_add(1, Ordering::Relaxed);
                }
            }
            output.auto_turn = step.rotation;
        }
        if let Some(vestibular) = &mut self.vestibular {
            output.vestibular = vestibular.update(&polygon, pose);
        }
        if let Some(ratchet) = &mut self.ratchet {
            output.ratchet = ratchet.update(&polygon, pose);
            if output.ratchet != 0.0 {
                if let Some(metrics) = &self.metrics {
                    metrics.ratchet_steps.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        for value in [&mut output.auto_turn, &mut output.vestibular, &mut output.ratchet] {
            if value.abs() < MIN_ROTATION {
                *value = 0.0;
            }
        }
        output
    }
}
