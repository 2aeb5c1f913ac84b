/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Web-head group: membership, roles, and the spring chain.
//!
//! The group owns the ordered collection of heads, enforces URL
//! uniqueness, decides which head is the master, and rebuilds the spring
//! chain whenever membership changes. All of this state belongs to the
//! control thread; nothing here is touched from workers.

use std::collections::HashMap;
use std::fmt;

use euclid::default::{Point2D, Vector2D};
use log::debug;
use url::Url;

use crate::config::{MAX_VISIBLE, PhysicsTuning};
use crate::physics::{SpringChain, SpringPair};
use crate::services::{IconAsset, ResolvedMeta};

/// Immutable creation flags for a head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadFlags {
    pub incognito: bool,
    pub from_amp: bool,
}

/// Role of a head within the group. Exactly one head is `Master` whenever
/// the group is non-empty; `Queued` heads sit beyond the visible cap and
/// take no part in the physics chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadRole {
    Master,
    Slave { rank: usize },
    Queued,
}

/// A single on-screen web head.
#[derive(Debug, Clone)]
pub struct WebHead {
    /// Identity: the normalized URL. Unique within the group.
    pub id: String,
    pub position: Point2D<f32>,
    /// Last gesture-down point; the group re-anchors here when this head
    /// is promoted to master after the old master is removed.
    pub touch_down: Point2D<f32>,
    pub role: HeadRole,
    /// Slot in the chain's slave list; `None` for the master and for
    /// queued heads. Valid only until the next rebuild.
    pub chain_index: Option<usize>,
    pub flags: HeadFlags,
    /// Resolved page metadata; absent until the fetch pipeline delivers.
    pub meta: Option<ResolvedMeta>,
    /// Decoded favicon and accent color; absent until delivered, and left
    /// absent forever on icon failure (default icon shown).
    pub icon: Option<IconAsset>,
    /// Group-wide theme color broadcast to every head.
    pub group_color: Option<[u8; 3]>,
}

impl WebHead {
    fn new(id: String, position: Point2D<f32>, flags: HeadFlags) -> Self {
        Self {
            id,
            position,
            touch_down: position,
            role: HeadRole::Master,
            chain_index: None,
            flags,
            meta: None,
            icon: None,
            group_color: None,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, HeadRole::Master)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.role, HeadRole::Queued)
    }

    /// Display title: resolved page title, or the bare URL.
    pub fn display_title(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|meta| meta.title.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Why a head (or the whole group) was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    UserDismissed,
    TrashZone,
    Teardown,
}

/// Events reported back to the embedding layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    Removed { url: String, cause: RemovalCause },
    /// The last head is gone; the caller tears the subsystem down.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddHeadError {
    /// A head for this URL (by identity, AMP, or canonical URL) is already
    /// open. Carries the existing head's id.
    AlreadyOpen { existing: String },
    InvalidUrl { url: String },
}

impl fmt::Display for AddHeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddHeadError::AlreadyOpen { existing } => {
                write!(f, "a web head for {existing} is already open")
            }
            AddHeadError::InvalidUrl { url } => write!(f, "not a usable URL: {url}"),
        }
    }
}

impl std::error::Error for AddHeadError {}

/// Normalize a URL into a head identity. Scheme defaults to https; the
/// host is lowercased by the parser.
pub fn normalize_url(raw: &str) -> Result<String, AddHeadError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AddHeadError::InvalidUrl { url: raw.to_string() });
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).map_err(|_| AddHeadError::InvalidUrl {
        url: raw.to_string(),
    })?;
    if !parsed.has_host() {
        return Err(AddHeadError::InvalidUrl { url: raw.to_string() });
    }
    Ok(parsed.to_string())
}

/// The ordered collection of web heads plus the spring chain that animates
/// them.
pub struct HeadGroup {
    heads: HashMap<String, WebHead>,
    /// Insertion order of head ids, oldest first.
    order: Vec<String>,
    chain: SpringChain,
    tuning: PhysicsTuning,
    /// Where the group anchors when no drag is active; new heads spawn
    /// here and settling masters return here.
    rest_position: Point2D<f32>,
}

impl HeadGroup {
    pub fn new(screen_width: f32, tuning: PhysicsTuning) -> Self {
        Self {
            heads: HashMap::new(),
            order: Vec::new(),
            chain: SpringChain::new(screen_width, &tuning),
            tuning,
            rest_position: Point2D::zero(),
        }
    }

    pub fn set_rest_position(&mut self, position: Point2D<f32>) {
        self.rest_position = position;
    }

    pub fn rest_position(&self) -> Point2D<f32> {
        self.rest_position
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.heads.contains_key(id)
    }

    pub fn head(&self, id: &str) -> Option<&WebHead> {
        self.heads.get(id)
    }

    pub fn head_mut(&mut self, id: &str) -> Option<&mut WebHead> {
        self.heads.get_mut(id)
    }

    /// Head ids in insertion order, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn heads(&self) -> impl Iterator<Item = &WebHead> {
        self.order.iter().filter_map(|id| self.heads.get(id))
    }

    pub fn master_id(&self) -> Option<&str> {
        self.order.last().map(String::as_str)
    }

    pub fn master(&self) -> Option<&WebHead> {
        self.master_id().and_then(|id| self.heads.get(id))
    }

    pub fn chain(&self) -> &SpringChain {
        &self.chain
    }

    /// Whether any existing head already answers for `normalized`:
    /// identity, AMP URL, or canonical URL match, case-insensitive.
    fn find_matching(&self, normalized: &str) -> Option<&str> {
        for head in self.heads.values() {
            if head.id.eq_ignore_ascii_case(normalized) {
                return Some(&head.id);
            }
            if let Some(meta) = &head.meta {
                let amp_hit = meta
                    .amp_url
                    .as_deref()
                    .is_some_and(|amp| amp.eq_ignore_ascii_case(normalized));
                let canonical_hit = meta
                    .canonical_url
                    .as_deref()
                    .is_some_and(|canon| canon.eq_ignore_ascii_case(normalized));
                if amp_hit || canonical_hit {
                    return Some(&head.id);
                }
            }
        }
        None
    }

    /// Create a head for `url` and promote it to master.
    ///
    /// Fails when a head already answers for the URL. On success the prior
    /// master (if any) becomes a slave and the chain is rebuilt. Returns
    /// the new head's id.
    pub fn add(&mut self, url: &str, flags: HeadFlags) -> Result<String, AddHeadError> {
        let id = normalize_url(url)?;
        if let Some(existing) = self.find_matching(&id) {
            return Err(AddHeadError::AlreadyOpen {
                existing: existing.to_string(),
            });
        }

        let spawn = self.master().map(|m| m.position).unwrap_or(self.rest_position);
        self.heads.insert(id.clone(), WebHead::new(id.clone(), spawn, flags));
        self.order.push(id.clone());
        self.rebuild();
        Ok(id)
    }

    /// Remove a head. Promotes the most recently added survivor when the
    /// master goes away, re-anchoring the group at the new master's last
    /// touch-down point. Reports `Empty` after the last head.
    pub fn remove(&mut self, id: &str, cause: RemovalCause) -> Vec<GroupEvent> {
        let Some(removed) = self.heads.remove(id) else {
            return Vec::new();
        };
        self.order.retain(|existing| existing != id);

        let mut events = vec![GroupEvent::Removed {
            url: removed.id.clone(),
            cause,
        }];

        if self.heads.is_empty() {
            self.chain.clear();
            events.push(GroupEvent::Empty);
            return events;
        }

        let was_master = removed.is_master();
        self.rebuild();

        if was_master {
            // Most recently added survivor is the new master; the whole
            // group glides over to where it was last picked up.
            let anchor = self.master().map(|m| m.touch_down).unwrap_or(self.rest_position);
            if let Some(master) = self.chain.master_mut() {
                master.set_end_value(anchor);
            }
            self.chain.perform_group_move(anchor.x, anchor.y);
        }
        events
    }

    /// Remove every head at once (trash-zone drop or teardown).
    pub fn remove_all(&mut self, cause: RemovalCause) -> Vec<GroupEvent> {
        let mut events: Vec<GroupEvent> = self
            .order
            .drain(..)
            .map(|url| GroupEvent::Removed { url, cause })
            .collect();
        self.heads.clear();
        self.chain.clear();
        if !events.is_empty() {
            events.push(GroupEvent::Empty);
        }
        events
    }

    /// Recompute every role from reverse insertion order and rebuild the
    /// chain from scratch. Friction grows with rank distance from the
    /// master, so trailing heads settle more slowly; queued heads get no
    /// spring at all.
    fn rebuild(&mut self) {
        for (back_index, id) in self.order.iter().rev().enumerate() {
            let Some(head) = self.heads.get_mut(id) else {
                continue;
            };
            head.role = match back_index {
                0 => HeadRole::Master,
                rank if rank < MAX_VISIBLE => HeadRole::Slave { rank },
                _ => HeadRole::Queued,
            };
            head.chain_index = match head.role {
                HeadRole::Slave { rank } => Some(rank - 1),
                _ => None,
            };
        }

        self.chain.clear();
        let Some(master_position) = self.master().map(|head| head.position) else {
            return;
        };
        self.chain.set_master(SpringPair::new(
            master_position,
            self.tuning.tension,
            self.tuning.base_friction,
            self.tuning.rest_epsilon,
        ));

        // Slaves by ascending rank = reverse insertion order, skipping the
        // master, stopping at the visible cap.
        for (back_index, id) in self.order.iter().rev().enumerate().skip(1) {
            if back_index >= MAX_VISIBLE {
                break;
            }
            let Some(head) = self.heads.get(id) else {
                continue;
            };
            let friction = self.tuning.base_friction
                + (back_index - 1) as f32 * self.tuning.friction_step;
            self.chain.add_slave(SpringPair::new(
                head.position,
                self.tuning.tension,
                friction,
                self.tuning.rest_epsilon,
            ));
        }

        // No animated jump on membership change.
        self.chain.rest();
        debug!(
            "head group rebuilt: {} heads, {} chained slaves",
            self.heads.len(),
            self.chain.slave_count()
        );
    }

    /// Record a gesture-down on the master and pin its spring to the
    /// pointer.
    pub fn begin_master_drag(&mut self, point: Point2D<f32>) {
        if let Some(id) = self.master_id().map(str::to_string) {
            if let Some(head) = self.heads.get_mut(&id) {
                head.touch_down = point;
            }
        }
        if let Some(master) = self.chain.master_mut() {
            master.set_current(point);
        }
    }

    /// Drive the master to the pointer and fan the slaves after it.
    pub fn move_master(&mut self, point: Point2D<f32>) {
        if let Some(master) = self.chain.master_mut() {
            master.set_current(point);
        }
        self.chain.perform_group_move(point.x, point.y);
    }

    /// Release toward the group's rest anchor with no residual velocity.
    pub fn settle_master(&mut self) {
        let anchor = self.rest_position;
        if let Some(master) = self.chain.master_mut() {
            master.set_end_value(anchor);
        }
        self.chain.perform_group_move(anchor.x, anchor.y);
    }

    /// Release toward the rest anchor carrying the fling velocity.
    pub fn fling_master(&mut self, velocity: Vector2D<f32>) {
        let anchor = self.rest_position;
        if let Some(master) = self.chain.master_mut() {
            master.set_velocity(velocity);
            master.set_end_value(anchor);
        }
        self.chain.perform_group_move(anchor.x, anchor.y);
    }

    /// Toggle trash-zone capture: while captured, slaves collapse onto the
    /// master instead of fanning.
    pub fn set_target_captured(&mut self, captured: bool) {
        if captured {
            self.chain.disable_displacement();
        } else {
            self.chain.enable_displacement();
        }
    }

    /// Broadcast a group-wide theme color to every head.
    pub fn set_group_color(&mut self, color: [u8; 3]) {
        for head in self.heads.values_mut() {
            head.group_color = Some(color);
        }
    }

    /// Advance the chain and write spring positions back into the heads.
    /// Returns true while anything is still moving.
    pub fn step(&mut self, dt: f32) -> bool {
        let Some(tick) = self.chain.step(dt) else {
            return false;
        };

        if let Some(id) = self.master_id().map(str::to_string) {
            if let Some(head) = self.heads.get_mut(&id) {
                head.position = tick.master;
            }
        }
        let slave_ids: Vec<(String, usize)> = self
            .heads
            .values()
            .filter_map(|head| head.chain_index.map(|idx| (head.id.clone(), idx)))
            .collect();
        for (id, idx) in slave_ids {
            if let (Some(head), Some(position)) =
                (self.heads.get_mut(&id), tick.slaves.get(idx))
            {
                head.position = *position;
            }
        }
        tick.moving
    }
}
