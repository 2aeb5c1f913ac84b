/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Drag gesture handling for web heads.
//!
//! A [`DragSession`] lives for exactly one gesture: created at
//! pointer-down, consumed at pointer-up. It owns its own
//! [`MotionHistory`] (no shared tracker state) and reduces the gesture to
//! a [`DragOutcome`] that the coordinator applies; detection and
//! application stay decoupled so outcomes are testable without a UI.

use euclid::default::{Point2D, Vector2D};

use crate::config::WebHeadConfig;
use crate::motion::MotionHistory;

/// How a finished drag should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// Cumulative displacement crossed the dismiss distance: discard the
    /// dragged head.
    Dismiss,
    /// Fast release: let the head fly with the polarity-corrected
    /// velocity.
    Fling { velocity: Vector2D<f32> },
    /// Slow release: animate back to rest.
    Settle,
}

/// State for one in-progress drag gesture.
#[derive(Debug)]
pub struct DragSession {
    history: MotionHistory,
    origin: Point2D<f32>,
    last: Point2D<f32>,
    /// Per-axis sum of absolute pointer travel since gesture-down.
    accumulated: Vector2D<f32>,
}

impl DragSession {
    /// Start a gesture at the pointer-down position.
    pub fn begin(point: Point2D<f32>) -> Self {
        let mut history = MotionHistory::new();
        history.record(point);
        Self {
            history,
            origin: point,
            last: point,
            accumulated: Vector2D::zero(),
        }
    }

    pub fn origin(&self) -> Point2D<f32> {
        self.origin
    }

    pub fn last(&self) -> Point2D<f32> {
        self.last
    }

    /// Record pointer travel. Returns the new pointer position so callers
    /// can forward it straight into the spring chain.
    pub fn move_to(&mut self, point: Point2D<f32>) -> Point2D<f32> {
        self.accumulated.x += (point.x - self.last.x).abs();
        self.accumulated.y += (point.y - self.last.y).abs();
        self.last = point;
        self.history.record(point);
        point
    }

    /// Cumulative per-axis absolute displacement so far.
    pub fn accumulated(&self) -> Vector2D<f32> {
        self.accumulated
    }

    /// Finish the gesture and classify it.
    ///
    /// `raw_vx`/`raw_vy` are the platform's instantaneous velocity
    /// estimates; their signs are untrusted and corrected from the sample
    /// history. Consumes the session — its history dies with the gesture.
    pub fn finish(mut self, raw_vx: f32, raw_vy: f32, config: &WebHeadConfig) -> DragOutcome {
        let outcome = if self.accumulated.x >= config.dismiss_distance
            || self.accumulated.y >= config.dismiss_distance
        {
            DragOutcome::Dismiss
        } else {
            match self.history.adjusted_velocity(raw_vx, raw_vy) {
                Some(velocity) if velocity.length() >= config.physics.min_fling_velocity => {
                    DragOutcome::Fling { velocity }
                }
                _ => DragOutcome::Settle,
            }
        };
        self.history.reset();
        outcome
    }
}
