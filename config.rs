/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tuning and behavior configuration for the web-head engine.
//!
//! All knobs are serde-backed so an embedding app can persist them as TOML
//! alongside its other settings. Defaults match the shipped behavior.

use serde::{Deserialize, Serialize};

/// Maximum number of physics-active heads (master + non-queued slaves).
/// Heads beyond this are marked `Queued` and excluded from the chain.
pub const MAX_VISIBLE: usize = 5;

/// Spring and displacement tuning for the head chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsTuning {
    /// Spring tension shared by every spring in the chain.
    pub tension: f32,
    /// Friction of the master spring and the first slave.
    pub base_friction: f32,
    /// Per-rank friction increment; slaves further from the master settle
    /// more slowly, producing the trailing-string visual.
    pub friction_step: f32,
    /// Horizontal displacement added per slave rank during a group move.
    pub displacement_x: f32,
    /// Vertical displacement added per slave rank during a group move.
    pub displacement_y: f32,
    /// Displacement and velocity below which a spring snaps to rest.
    pub rest_epsilon: f32,
    /// Minimum release speed (px/s) for a drag to count as a fling.
    pub min_fling_velocity: f32,
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        Self {
            tension: 96.0,
            base_friction: 12.0,
            friction_step: 3.0,
            displacement_x: 16.0,
            displacement_y: 4.0,
            rest_epsilon: 0.5,
            min_fling_velocity: 800.0,
        }
    }
}

/// Behavior configuration for the whole web-head subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebHeadConfig {
    /// Screen width in pixels; decides which way slave displacement fans.
    pub screen_width: f32,
    /// Cumulative per-axis drag distance at which a drag dismisses the head.
    pub dismiss_distance: f32,
    /// Pre-warm the rendering backend at submission time instead of waiting
    /// for resolved metadata.
    pub eager_prewarm: bool,
    /// Connect/read timeout for each metadata or icon fetch attempt.
    pub fetch_timeout_secs: u64,
    pub physics: PhysicsTuning,
}

impl Default for WebHeadConfig {
    fn default() -> Self {
        Self {
            screen_width: 1080.0,
            dismiss_distance: 220.0,
            eager_prewarm: false,
            fetch_timeout_secs: 8,
            physics: PhysicsTuning::default(),
        }
    }
}

impl WebHeadConfig {
    /// Parse a config from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
