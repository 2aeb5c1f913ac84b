/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Floating web-head coordination and physics engine.
//!
//! A web head is a draggable on-screen bubble representing one in-flight
//! browsing request. This crate owns the hard parts of that feature:
//!
//! - `motion`: bounded pointer-sample history and polarity-corrected
//!   fling velocity
//! - `physics`: the master/slave spring chain that makes the group trail
//!   the dragged head
//! - `group`: membership, URL uniqueness, master reassignment, and the
//!   visible-head queue cap
//! - `input`: drag classification into dismiss / fling / settle
//! - `pipeline`: concurrent, deduplicated, cancellable per-head metadata
//!   fetching
//! - `services`: the external collaborators (resolver, icon loader,
//!   pre-warm, persistence, launcher, overlay gate) plus default
//!   reqwest/image-backed implementations
//! - `app`: the control-thread coordinator tying it all together
//!
//! Rendering, overlay permission prompting, and notification UI are the
//! embedding application's responsibility; they are reached only through
//! the trait seams in [`services`].

pub mod app;
pub mod config;
pub mod group;
pub mod input;
pub mod motion;
pub mod physics;
pub mod pipeline;
pub mod services;

pub use app::{Collaborators, StartError, WebHeadApp};
pub use config::{PhysicsTuning, WebHeadConfig};
pub use group::{
    normalize_url, AddHeadError, GroupEvent, HeadFlags, HeadGroup, HeadRole, RemovalCause, WebHead,
};
pub use input::{DragOutcome, DragSession};
pub use motion::MotionHistory;
pub use physics::{SpringChain, SpringPair};
pub use pipeline::{GroupIntent, MetadataPipeline, PipelineServices};
pub use services::{
    BrowserLauncher, IconAsset, IconError, IconLoader, LaunchOptions, MetadataResolver,
    MetadataStore, OverlayGate, PrewarmService, ResolveError, ResolvedMeta,
};
