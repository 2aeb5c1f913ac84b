/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-head metadata fetch pipeline.
//!
//! Bridges concurrent fetch workers to the synchronous control-thread
//! coordinator without compromising determinism: workers communicate
//! exclusively through the [`QueuedIntent`] channel, which the control
//! thread drains each tick via [`MetadataPipeline::drain_pending`] before
//! applying intents. The coordinator stays 100% synchronous.
//!
//! Dedup: at most one in-flight fetch per normalized URL. A second
//! `fetch` for the same URL while the first is running attaches to it —
//! no second network round-trip. The in-flight set is the only structure
//! shared between the control thread (submission) and workers
//! (completion); it is lock-protected.
//!
//! Cancellation is group-scoped: `shutdown` cancels every outstanding
//! worker through one shared token. A single removed head's pending
//! result is not aborted, only discarded at delivery time by the
//! coordinator's liveness guard.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::services::{
    IconAsset, IconLoader, MetadataResolver, MetadataStore, PrewarmService, ResolvedMeta,
};

/// Capacity of the intent channel — limits flooding from workers.
const INTENT_CHANNEL_CAPACITY: usize = 64;

/// State mutations produced outside the coordinator and applied by it.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupIntent {
    /// Resolved page metadata for a head.
    SetHeadMeta { url: String, meta: ResolvedMeta },
    /// Resolution failed; the head stays bare (URL-only presentation).
    MetaFetchFailed { url: String },
    /// Decoded favicon and accent color for a head. Always delivered
    /// after that head's `SetHeadMeta`.
    SetHeadIcon { url: String, icon: IconAsset },
    /// Group-wide theme color change.
    SetGroupColor { color: [u8; 3] },
}

/// Source of a queued intent, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    LocalUi,
    FetchWorker,
}

/// Intent with submission metadata for the queue.
#[derive(Debug, Clone)]
pub struct QueuedIntent {
    pub intent: GroupIntent,
    pub queued_at: Instant,
    pub source: IntentSource,
}

/// The collaborator bundle a pipeline fans work out to.
#[derive(Clone)]
pub struct PipelineServices {
    pub resolver: Arc<dyn MetadataResolver>,
    pub icons: Arc<dyn IconLoader>,
    pub prewarm: Arc<dyn PrewarmService>,
    pub store: Arc<dyn MetadataStore>,
}

/// Supervised fetch workers plus the intent channel back to the control
/// thread.
pub struct MetadataPipeline {
    services: PipelineServices,
    intent_tx: mpsc::Sender<QueuedIntent>,
    intent_rx: mpsc::Receiver<QueuedIntent>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
    handle: Handle,
    eager_prewarm: bool,
}

impl MetadataPipeline {
    /// Create a pipeline whose workers run on the given runtime handle.
    pub fn new(services: PipelineServices, handle: Handle, eager_prewarm: bool) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        Self {
            services,
            intent_tx,
            intent_rx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
            handle,
            eager_prewarm,
        }
    }

    /// A sender for coordinator-side producers (preference changes etc.)
    /// that want to queue intents alongside worker results.
    pub fn intent_sender(&self) -> mpsc::Sender<QueuedIntent> {
        self.intent_tx.clone()
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.lock().contains(url)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Start a metadata fetch for `url`, or attach to the one already
    /// running. Returns true when a new worker was spawned.
    pub fn fetch(&mut self, url: &str, incognito: bool) -> bool {
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(url.to_string()) {
                debug!("fetch already in flight for {url}, attaching");
                return false;
            }
        }

        if self.eager_prewarm {
            let prewarm = Arc::clone(&self.services.prewarm);
            let target = url.to_string();
            self.handle.spawn_blocking(move || prewarm.prewarm(&target));
        }

        let services = self.services.clone();
        let tx = self.intent_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let cancel = self.cancel.clone();
        let skip_prewarm = self.eager_prewarm;
        let url = url.to_string();

        self.workers.spawn_on(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("fetch worker cancelled for {url}");
                    }
                    _ = fetch_worker(services, url.clone(), incognito, skip_prewarm, tx) => {}
                }
                in_flight.lock().remove(&url);
            },
            &self.handle,
        );
        true
    }

    /// Drain all pending intents from workers (non-blocking). Call once
    /// per tick before applying intents.
    pub fn drain_pending(&mut self) -> Vec<GroupIntent> {
        let mut intents = Vec::new();
        while let Ok(queued) = self.intent_rx.try_recv() {
            intents.push(queued.intent);
        }
        intents
    }

    /// Cancel every outstanding fetch. Scoped to the whole group: called
    /// when the group is torn down.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.workers.abort_all();
        self.in_flight.lock().clear();
    }
}

impl Drop for MetadataPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One head's fetch: cache → resolve → persist → meta intent → prewarm →
/// icon intent. Metadata delivery always precedes icon delivery; the
/// favicon fetch only starts once an icon URL is known.
async fn fetch_worker(
    services: PipelineServices,
    url: String,
    incognito: bool,
    skip_prewarm: bool,
    tx: mpsc::Sender<QueuedIntent>,
) {
    let cached = if incognito {
        None
    } else {
        let store = Arc::clone(&services.store);
        let key = url.clone();
        tokio::task::spawn_blocking(move || store.load_cached(&key))
            .await
            .ok()
            .flatten()
    };

    let meta = match cached {
        Some(meta) => {
            debug!("metadata cache hit for {url}");
            meta
        }
        None => {
            let resolver = Arc::clone(&services.resolver);
            let target = url.clone();
            match tokio::task::spawn_blocking(move || resolver.resolve(&target)).await {
                Ok(Ok(meta)) => {
                    if !incognito {
                        let store = Arc::clone(&services.store);
                        let key = url.clone();
                        let to_save = meta.clone();
                        let _ = tokio::task::spawn_blocking(move || store.save(&key, &to_save))
                            .await;
                    }
                    meta
                }
                Ok(Err(error)) => {
                    warn!("metadata resolution failed for {url}: {error}");
                    send(&tx, GroupIntent::MetaFetchFailed { url }).await;
                    return;
                }
                Err(error) => {
                    warn!("metadata resolver worker died for {url}: {error}");
                    send(&tx, GroupIntent::MetaFetchFailed { url }).await;
                    return;
                }
            }
        }
    };

    if !skip_prewarm {
        // Fire-and-forget hint; nothing awaits the result.
        let prewarm = Arc::clone(&services.prewarm);
        let target = meta.canonical_url.clone().unwrap_or_else(|| url.clone());
        tokio::task::spawn_blocking(move || prewarm.prewarm(&target));
    }

    let favicon_url = meta.favicon_url.clone();
    send(
        &tx,
        GroupIntent::SetHeadMeta {
            url: url.clone(),
            meta,
        },
    )
    .await;

    let Some(favicon_url) = favicon_url else {
        return;
    };
    let icons = Arc::clone(&services.icons);
    match tokio::task::spawn_blocking(move || icons.load_icon_and_accent(&favicon_url)).await {
        Ok(Ok(icon)) => {
            send(&tx, GroupIntent::SetHeadIcon { url, icon }).await;
        }
        Ok(Err(error)) => {
            // Default icon shown; not worth more than a debug line.
            debug!("favicon load failed for {url}: {error}");
        }
        Err(error) => {
            debug!("favicon worker died for {url}: {error}");
        }
    }
}

async fn send(tx: &mpsc::Sender<QueuedIntent>, intent: GroupIntent) {
    let queued = QueuedIntent {
        intent,
        queued_at: Instant::now(),
        source: IntentSource::FetchWorker,
    };
    if tx.send(queued).await.is_err() {
        debug!("intent channel closed, dropping fetch result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{IconError, ResolveError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl MetadataResolver for CountingResolver {
        fn resolve(&self, _url: &str) -> Result<ResolvedMeta, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.lock().unwrap().recv();
            Ok(ResolvedMeta {
                title: Some("Example".to_string()),
                ..Default::default()
            })
        }
    }

    struct NoIcons;
    impl IconLoader for NoIcons {
        fn load_icon_and_accent(&self, _favicon_url: &str) -> Result<IconAsset, IconError> {
            Err(IconError::Network("unused".to_string()))
        }
    }

    struct NoopPrewarm;
    impl PrewarmService for NoopPrewarm {
        fn prewarm(&self, _url: &str) {}
    }

    struct NoStore;
    impl MetadataStore for NoStore {
        fn save(&self, _url: &str, _meta: &ResolvedMeta) {}
        fn load_cached(&self, _url: &str) -> Option<ResolvedMeta> {
            None
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_fetches_share_one_resolution() {
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
            gate: std::sync::Mutex::new(release_rx),
        });
        let services = PipelineServices {
            resolver: resolver.clone(),
            icons: Arc::new(NoIcons),
            prewarm: Arc::new(NoopPrewarm),
            store: Arc::new(NoStore),
        };
        let mut pipeline = MetadataPipeline::new(services, Handle::current(), false);

        assert!(pipeline.fetch("https://a.example/", false));
        // Second submission before the first completes: attaches.
        assert!(!pipeline.fetch("https://a.example/", false));
        assert_eq!(pipeline.in_flight_count(), 1);

        release_tx.send(()).unwrap();
        // Wait for the single worker to deliver.
        let mut intents = Vec::new();
        for _ in 0..50 {
            intents.extend(pipeline.drain_pending());
            if !intents.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(intents.len(), 1);
        assert!(matches!(&intents[0], GroupIntent::SetHeadMeta { url, .. } if url == "https://a.example/"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completed_fetch_clears_in_flight_and_allows_refetch() {
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
            gate: std::sync::Mutex::new(release_rx),
        });
        let services = PipelineServices {
            resolver: resolver.clone(),
            icons: Arc::new(NoIcons),
            prewarm: Arc::new(NoopPrewarm),
            store: Arc::new(NoStore),
        };
        let mut pipeline = MetadataPipeline::new(services, Handle::current(), false);

        pipeline.fetch("https://a.example/", false);
        release_tx.send(()).unwrap();
        for _ in 0..50 {
            if pipeline.in_flight_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(pipeline.in_flight_count(), 0);

        // The URL may be fetched again now.
        assert!(pipeline.fetch("https://a.example/", false));
        release_tx.send(()).unwrap();
        for _ in 0..50 {
            if resolver.calls.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }
}
