/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Spring chain driving the web-head group animation.
//!
//! One master spring pair follows the dragged head; every slave pair is
//! given an end value derived from the master's position plus a
//! rank-dependent displacement, so the group trails the master as a
//! staggered string instead of a stack of overlapping bubbles.
//!
//! Motion is advanced by an explicit [`SpringChain::step`] call that
//! returns the positions for this tick. There are no listener callbacks:
//! the caller owns when and where spring state is read back.

use euclid::default::{Point2D, Vector2D};

use crate::config::{MAX_VISIBLE, PhysicsTuning};

/// A single damped 1-D spring integrated with explicit time steps.
#[derive(Debug, Clone, Copy)]
pub struct Spring {
    position: f32,
    velocity: f32,
    end_value: f32,
    tension: f32,
    friction: f32,
    rest_epsilon: f32,
}

impl Spring {
    pub fn new(position: f32, tension: f32, friction: f32, rest_epsilon: f32) -> Self {
        Self {
            position,
            velocity: 0.0,
            end_value: position,
            tension,
            friction,
            rest_epsilon,
        }
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn end_value(&self) -> f32 {
        self.end_value
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_end_value(&mut self, end: f32) {
        self.end_value = end;
    }

    /// Pin the spring to a position: current and end move together, motion
    /// stops. Used while the pointer drives the master directly.
    pub fn set_current(&mut self, position: f32) {
        self.position = position;
        self.end_value = position;
        self.velocity = 0.0;
    }

    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity;
    }

    /// Snap to the end value immediately, discarding velocity.
    pub fn rest(&mut self) {
        self.position = self.end_value;
        self.velocity = 0.0;
    }

    pub fn at_rest(&self) -> bool {
        (self.end_value - self.position).abs() < self.rest_epsilon
            && self.velocity.abs() < self.rest_epsilon
    }

    /// Advance the simulation by `dt` seconds. Returns true while moving.
    pub fn step(&mut self, dt: f32) -> bool {
        let accel = self.tension * (self.end_value - self.position) - self.friction * self.velocity;
        self.velocity += accel * dt;
        self.position += self.velocity * dt;

        if self.at_rest() {
            self.rest();
            return false;
        }
        true
    }
}

/// A 2-D spring: one [`Spring`] per axis.
#[derive(Debug, Clone, Copy)]
pub struct SpringPair {
    pub x: Spring,
    pub y: Spring,
}

impl SpringPair {
    pub fn new(position: Point2D<f32>, tension: f32, friction: f32, rest_epsilon: f32) -> Self {
        Self {
            x: Spring::new(position.x, tension, friction, rest_epsilon),
            y: Spring::new(position.y, tension, friction, rest_epsilon),
        }
    }

    pub fn position(&self) -> Point2D<f32> {
        Point2D::new(self.x.position(), self.y.position())
    }

    pub fn set_end_value(&mut self, end: Point2D<f32>) {
        self.x.set_end_value(end.x);
        self.y.set_end_value(end.y);
    }

    pub fn set_current(&mut self, position: Point2D<f32>) {
        self.x.set_current(position.x);
        self.y.set_current(position.y);
    }

    pub fn set_velocity(&mut self, velocity: Vector2D<f32>) {
        self.x.set_velocity(velocity.x);
        self.y.set_velocity(velocity.y);
    }

    pub fn rest(&mut self) {
        self.x.rest();
        self.y.rest();
    }

    pub fn step(&mut self, dt: f32) -> bool {
        let x_moving = self.x.step(dt);
        let y_moving = self.y.step(dt);
        x_moving || y_moving
    }
}

/// Positions produced by one chain step: master first, then slaves in
/// registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTick {
    pub master: Point2D<f32>,
    pub slaves: Vec<Point2D<f32>>,
    /// Whether any spring is still in motion after this step.
    pub moving: bool,
}

/// Master spring plus an ordered list of slave springs.
///
/// The chain is rebuilt, not patched, whenever group membership changes:
/// slave friction depends on rank order, so incremental edits would leave
/// stale coefficients behind.
#[derive(Debug, Default)]
pub struct SpringChain {
    master: Option<SpringPair>,
    slaves: Vec<SpringPair>,
    screen_width: f32,
    displacement_enabled: bool,
    displacement_x: f32,
    displacement_y: f32,
}

impl SpringChain {
    pub fn new(screen_width: f32, tuning: &PhysicsTuning) -> Self {
        Self {
            master: None,
            slaves: Vec::new(),
            screen_width,
            displacement_enabled: true,
            displacement_x: tuning.displacement_x,
            displacement_y: tuning.displacement_y,
        }
    }

    /// Detach and empty everything. Must precede any
    /// `set_master`/`add_slave` sequence when rebuilding, so springs from a
    /// deleted group can never drive the new one.
    pub fn clear(&mut self) {
        self.master = None;
        self.slaves.clear();
    }

    pub fn set_master(&mut self, spring: SpringPair) {
        self.master = Some(spring);
    }

    /// Register a slave spring. Ignored once the visible cap is reached;
    /// overflow heads are queued by the coordinator instead.
    pub fn add_slave(&mut self, spring: SpringPair) {
        if self.slaves.len() >= MAX_VISIBLE - 1 {
            return;
        }
        self.slaves.push(spring);
    }

    pub fn master(&self) -> Option<&SpringPair> {
        self.master.as_ref()
    }

    pub fn master_mut(&mut self) -> Option<&mut SpringPair> {
        self.master.as_mut()
    }

    pub fn slave(&self, index: usize) -> Option<&SpringPair> {
        self.slaves.get(index)
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    /// Whether the master sits in the right half of the screen.
    pub fn is_right(&self, master_x: f32) -> bool {
        master_x > self.screen_width / 2.0
    }

    pub fn enable_displacement(&mut self) {
        self.displacement_enabled = true;
    }

    /// Collapse slaves onto the master position during group moves. Used
    /// while the master is captured by the trash zone, so the fanned layout
    /// does not fight the capture animation.
    pub fn disable_displacement(&mut self) {
        self.displacement_enabled = false;
    }

    pub fn displacement_enabled(&self) -> bool {
        self.displacement_enabled
    }

    /// Propagate a master move to every slave.
    ///
    /// Slaves are walked in reverse registration order; the displacement
    /// grows by a fixed per-axis increment each step, fanning away from the
    /// screen edge the master is nearest to. No-op until a master is set.
    pub fn perform_group_move(&mut self, master_x: f32, master_y: f32) {
        if self.master.is_none() {
            return;
        }

        let step_x = if self.is_right(master_x) {
            -self.displacement_x
        } else {
            self.displacement_x
        };
        let step_y = self.displacement_y;

        let mut dx = 0.0;
        let mut dy = 0.0;
        for slave in self.slaves.iter_mut().rev() {
            if self.displacement_enabled {
                dx += step_x;
                dy += step_y;
            }
            slave.set_end_value(Point2D::new(master_x + dx, master_y + dy));
        }
    }

    /// Force every spring to its end value immediately. Used right after a
    /// rebuild so membership changes do not play out as an animated jump.
    pub fn rest(&mut self) {
        if let Some(master) = self.master.as_mut() {
            master.rest();
        }
        for slave in &mut self.slaves {
            slave.rest();
        }
    }

    /// Advance all springs by `dt` seconds and report this tick's positions.
    /// Returns `None` when no master is set.
    pub fn step(&mut self, dt: f32) -> Option<ChainTick> {
        let master = self.master.as_mut()?;
        let mut moving = master.step(dt);
        let master_pos = master.position();

        let mut slaves = Vec::with_capacity(self.slaves.len());
        for slave in &mut self.slaves {
            moving |= slave.step(dt);
            slaves.push(slave.position());
        }

        Some(ChainTick {
            master: master_pos,
            slaves,
            moving,
        })
    }
}
