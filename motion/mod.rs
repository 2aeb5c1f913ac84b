/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Bounded pointer-sample history for drag gestures.
//!
//! Raw pointer-velocity polarity is unreliable for quick, short flicks:
//! the instantaneous estimate can report a sign opposite to the direction
//! the finger actually traveled. [`MotionHistory`] keeps a short ring of
//! recent positions and re-signs the raw velocity to match the quadrant
//! observed between an older sample and the newest one.

use std::collections::VecDeque;

use euclid::default::{Point2D, Vector2D};

/// Number of samples retained; oldest evicted first.
pub const HISTORY_CAPACITY: usize = 10;

/// Minimum samples required before a velocity can be derived:
/// ceil(0.25 * capacity).
pub const VELOCITY_SAMPLE_THRESHOLD: usize = HISTORY_CAPACITY.div_ceil(4);

/// Screen quadrant of observed travel, derived from a down/up sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TravelQuadrant {
    DownRight,
    UpRight,
    UpLeft,
    DownLeft,
}

impl TravelQuadrant {
    fn classify(down: Point2D<f32>, up: Point2D<f32>) -> Self {
        let right = up.x >= down.x;
        // Screen coordinates: y grows downward.
        let down_travel = up.y >= down.y;
        match (right, down_travel) {
            (true, true) => TravelQuadrant::DownRight,
            (true, false) => TravelQuadrant::UpRight,
            (false, false) => TravelQuadrant::UpLeft,
            (false, true) => TravelQuadrant::DownLeft,
        }
    }

    /// Force the raw velocity components to the signs this quadrant implies.
    fn apply(self, raw_vx: f32, raw_vy: f32) -> Vector2D<f32> {
        let vx = raw_vx.abs();
        let vy = raw_vy.abs();
        match self {
            TravelQuadrant::DownRight => Vector2D::new(vx, vy),
            TravelQuadrant::UpRight => Vector2D::new(vx, -vy),
            TravelQuadrant::UpLeft => Vector2D::new(-vx, -vy),
            TravelQuadrant::DownLeft => Vector2D::new(-vx, vy),
        }
    }
}

/// Ring buffer of recent pointer samples for one active drag.
///
/// Created at gesture-down, dropped at gesture-up; never persisted and
/// never shared across gestures.
#[derive(Debug, Default)]
pub struct MotionHistory {
    samples: VecDeque<Point2D<f32>>,
}

impl MotionHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest once the buffer is full.
    pub fn record(&mut self, point: Point2D<f32>) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(point);
    }

    /// Clear all samples. Called at gesture start and end.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Re-sign a raw velocity estimate from the recorded travel direction.
    ///
    /// Returns `None` when fewer than [`VELOCITY_SAMPLE_THRESHOLD`] samples
    /// have been recorded — not enough signal to trust a direction.
    pub fn adjusted_velocity(&self, raw_vx: f32, raw_vy: f32) -> Option<Vector2D<f32>> {
        let size = self.samples.len();
        if size < VELOCITY_SAMPLE_THRESHOLD {
            return None;
        }
        let down = self.samples[size - VELOCITY_SAMPLE_THRESHOLD];
        let up = self.samples[size - 1];
        Some(TravelQuadrant::classify(down, up).apply(raw_vx, raw_vy))
    }
}
