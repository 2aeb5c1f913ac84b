/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Application-level coordinator for the web-head subsystem.
//!
//! [`WebHeadApp`] is owned by the UI-affine control thread. It routes new
//! URL requests into the group, gestures into the spring chain, and
//! drains fetch-worker intents each tick before applying them. Intents
//! whose head no longer exists are dropped here — that is the expected
//! fate of a fetch that outlives its head, not an error.

use std::fmt;
use std::sync::Arc;

use euclid::default::Point2D;
use log::debug;
use tokio::runtime::Handle;

use crate::config::WebHeadConfig;
use crate::group::{AddHeadError, GroupEvent, HeadFlags, HeadGroup, RemovalCause, WebHead};
use crate::input::{DragOutcome, DragSession};
use crate::pipeline::{GroupIntent, MetadataPipeline, PipelineServices};
use crate::services::{BrowserLauncher, LaunchOptions, OverlayGate};

/// Everything the engine needs from the embedding application.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn crate::services::MetadataResolver>,
    pub icons: Arc<dyn crate::services::IconLoader>,
    pub prewarm: Arc<dyn crate::services::PrewarmService>,
    pub store: Arc<dyn crate::services::MetadataStore>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub overlay_gate: Arc<dyn OverlayGate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// The platform will not let this process draw floating overlays.
    /// Fatal; the caller redirects the user to a permission prompt.
    OverlayPermissionDenied,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::OverlayPermissionDenied => {
                write!(f, "overlay permission denied; web heads cannot start")
            }
        }
    }
}

impl std::error::Error for StartError {}

/// Control-thread coordinator: group + pipeline + gesture state.
pub struct WebHeadApp {
    config: WebHeadConfig,
    pub group: HeadGroup,
    pipeline: MetadataPipeline,
    launcher: Arc<dyn BrowserLauncher>,
    drag: Option<DragSession>,
}

impl WebHeadApp {
    /// Start the subsystem. Consults the overlay gate first; denial is
    /// fatal and nothing is created.
    pub fn start(
        config: WebHeadConfig,
        collaborators: Collaborators,
        handle: Handle,
    ) -> Result<Self, StartError> {
        if !collaborators.overlay_gate.can_draw_overlays() {
            return Err(StartError::OverlayPermissionDenied);
        }

        let group = HeadGroup::new(config.screen_width, config.physics);
        let pipeline = MetadataPipeline::new(
            PipelineServices {
                resolver: collaborators.resolver,
                icons: collaborators.icons,
                prewarm: collaborators.prewarm,
                store: collaborators.store,
            },
            handle,
            config.eager_prewarm,
        );
        Ok(Self {
            config,
            group,
            pipeline,
            launcher: collaborators.launcher,
            drag: None,
        })
    }

    pub fn config(&self) -> &WebHeadConfig {
        &self.config
    }

    /// A new URL arrives: create a head, make it master, start its fetch.
    pub fn open_url(&mut self, url: &str, flags: HeadFlags) -> Result<String, AddHeadError> {
        let id = self.group.add(url, flags)?;
        self.pipeline.fetch(&id, flags.incognito);
        Ok(id)
    }

    /// Tap on a head: hand the URL to the browser with the head's flags
    /// and best-known accent color.
    pub fn tap(&self, id: &str) {
        let Some(head) = self.group.head(id) else {
            return;
        };
        let accent_color = head
            .icon
            .as_ref()
            .map(|icon| icon.accent_color)
            .or_else(|| head.meta.as_ref().and_then(|meta| meta.theme_color))
            .or(head.group_color);
        self.launcher.open_in_browser(
            &head.id,
            LaunchOptions {
                incognito: head.flags.incognito,
                accent_color,
            },
        );
    }

    pub fn remove(&mut self, id: &str, cause: RemovalCause) -> Vec<GroupEvent> {
        self.group.remove(id, cause)
    }

    /// Trash-zone drop of the master: the whole group goes away.
    pub fn drop_on_trash(&mut self) -> Vec<GroupEvent> {
        self.drag = None;
        self.group.remove_all(RemovalCause::TrashZone)
    }

    /// Tear the subsystem down, cancelling every outstanding fetch.
    pub fn teardown(&mut self) -> Vec<GroupEvent> {
        self.drag = None;
        self.pipeline.shutdown();
        self.group.remove_all(RemovalCause::Teardown)
    }

    /// Gesture-down on the master head.
    pub fn begin_drag(&mut self, point: Point2D<f32>) {
        self.group.begin_master_drag(point);
        self.drag = Some(DragSession::begin(point));
    }

    /// Pointer moved while dragging.
    pub fn drag_to(&mut self, point: Point2D<f32>) {
        let Some(session) = self.drag.as_mut() else {
            return;
        };
        let point = session.move_to(point);
        self.group.move_master(point);
    }

    /// Gesture-up: classify and apply the outcome.
    pub fn end_drag(&mut self, raw_vx: f32, raw_vy: f32) -> Vec<GroupEvent> {
        let Some(session) = self.drag.take() else {
            return Vec::new();
        };
        match session.finish(raw_vx, raw_vy, &self.config) {
            DragOutcome::Dismiss => {
                let Some(master) = self.group.master_id().map(str::to_string) else {
                    return Vec::new();
                };
                self.group.remove(&master, RemovalCause::UserDismissed)
            }
            DragOutcome::Fling { velocity } => {
                self.group.fling_master(velocity);
                Vec::new()
            }
            DragOutcome::Settle => {
                self.group.settle_master();
                Vec::new()
            }
        }
    }

    /// Master entered or left the trash zone's capture radius.
    pub fn set_target_captured(&mut self, captured: bool) {
        self.group.set_target_captured(captured);
    }

    /// Group-wide theme color preference changed.
    pub fn set_group_color(&mut self, color: [u8; 3]) {
        self.group.set_group_color(color);
    }

    /// One control-thread tick: drain worker intents, apply them, and
    /// advance the physics. Returns true while anything is still moving.
    pub fn tick(&mut self, dt: f32) -> bool {
        let intents = self.pipeline.drain_pending();
        self.apply_intents(intents);
        self.group.step(dt)
    }

    /// Apply queued intents. Results for heads that no longer exist are
    /// silently discarded — expected under fast add/remove churn.
    pub fn apply_intents(&mut self, intents: Vec<GroupIntent>) {
        for intent in intents {
            match intent {
                GroupIntent::SetHeadMeta { url, meta } => {
                    match self.group.head_mut(&url) {
                        Some(head) => head.meta = Some(meta),
                        None => debug!("dropping metadata for removed head {url}"),
                    }
                }
                GroupIntent::MetaFetchFailed { url } => {
                    // Head stays bare and usable; nothing to roll back.
                    debug!("head {url} keeps URL-only presentation");
                }
                GroupIntent::SetHeadIcon { url, icon } => {
                    match self.group.head_mut(&url) {
                        Some(head) => head.icon = Some(icon),
                        None => debug!("dropping icon for removed head {url}"),
                    }
                }
                GroupIntent::SetGroupColor { color } => {
                    self.group.set_group_color(color);
                }
            }
        }
    }

    pub fn head(&self, id: &str) -> Option<&WebHead> {
        self.group.head(id)
    }
}
