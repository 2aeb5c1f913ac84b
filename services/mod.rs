/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! External collaborator seams for the web-head engine.
//!
//! The engine core never talks to the network, the disk, or the platform
//! window system directly; everything outside the control loop arrives
//! through these traits. All of them are synchronous and blocking — the
//! fetch pipeline calls them from `spawn_blocking` workers, never from the
//! control thread.
//!
//! Default reqwest/image-backed implementations live in [`http`].

pub mod http;

use std::fmt;

/// Page metadata resolved for a URL: title, theme color, alternate URLs,
/// and where to find the favicon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMeta {
    pub title: Option<String>,
    pub canonical_url: Option<String>,
    pub amp_url: Option<String>,
    pub theme_color: Option<[u8; 3]>,
    pub favicon_url: Option<String>,
}

/// Decoded favicon pixels plus a representative accent color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconAsset {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub accent_color: [u8; 3],
}

/// Options forwarded to the browser when a head is tapped open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub incognito: bool,
    /// Toolbar tint, when the head has one loaded.
    pub accent_color: Option<[u8; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Network(String),
    Parse(String),
    Timeout,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Network(detail) => write!(f, "metadata fetch failed: {detail}"),
            ResolveError::Parse(detail) => write!(f, "metadata parse failed: {detail}"),
            ResolveError::Timeout => write!(f, "metadata fetch timed out"),
        }
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconError {
    Network(String),
    Decode(String),
}

impl fmt::Display for IconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IconError::Network(detail) => write!(f, "favicon fetch failed: {detail}"),
            IconError::Decode(detail) => write!(f, "favicon decode failed: {detail}"),
        }
    }
}

impl std::error::Error for IconError {}

/// Resolves a URL to page metadata. Fallible; failures downgrade the head
/// to a bare URL-only presentation, never to a user-facing error.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<ResolvedMeta, ResolveError>;
}

/// Fetches and decodes a favicon, deriving a representative accent color.
pub trait IconLoader: Send + Sync {
    fn load_icon_and_accent(&self, favicon_url: &str) -> Result<IconAsset, IconError>;
}

/// Fire-and-forget hint to the rendering backend that a URL is about to be
/// opened. No result is awaited.
pub trait PrewarmService: Send + Sync {
    fn prewarm(&self, url: &str);
}

/// Durable metadata cache. Consulted and written for normal heads only;
/// incognito heads never touch it.
pub trait MetadataStore: Send + Sync {
    fn save(&self, url: &str, meta: &ResolvedMeta);
    fn load_cached(&self, url: &str) -> Option<ResolvedMeta>;
}

/// Opens a URL in the full browser when a head is tapped.
pub trait BrowserLauncher: Send + Sync {
    fn open_in_browser(&self, url: &str, options: LaunchOptions);
}

/// Platform gate: may this process draw floating overlays at all?
/// Consulted once before the group is created; denial is fatal to startup.
pub trait OverlayGate: Send + Sync {
    fn can_draw_overlays(&self) -> bool;
}
