//! End-to-end scenarios driving [`WebHeadApp`] through its public API with
//! mock collaborators: submission, fetch delivery, churn, and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bubbleshell::{
    Collaborators, GroupEvent, HeadFlags, IconAsset, IconError, IconLoader, LaunchOptions,
    MetadataResolver, MetadataStore, OverlayGate, PrewarmService, RemovalCause, ResolveError,
    ResolvedMeta, WebHeadApp, WebHeadConfig,
};

const DT: f32 = 1.0 / 60.0;

struct ScriptedResolver {
    calls: AtomicUsize,
    fail: bool,
    /// When set, resolution blocks until the gate channel yields.
    gate: Option<std::sync::Mutex<std::sync::mpsc::Receiver<()>>>,
}

impl ScriptedResolver {
    fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
            gate: None,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
            gate: None,
        }
    }

    fn gated() -> (Self, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let resolver = Self {
            calls: AtomicUsize::new(0),
            fail: false,
            gate: Some(std::sync::Mutex::new(rx)),
        };
        (resolver, tx)
    }
}

impl MetadataResolver for ScriptedResolver {
    fn resolve(&self, url: &str) -> Result<ResolvedMeta, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        if self.fail {
            return Err(ResolveError::Network("connection refused".to_string()));
        }
        Ok(ResolvedMeta {
            title: Some(format!("Title of {url}")),
            theme_color: Some([0x21, 0x96, 0xF3]),
            favicon_url: Some(format!("{url}favicon.ico")),
            ..Default::default()
        })
    }
}

struct PixelIcons;
impl IconLoader for PixelIcons {
    fn load_icon_and_accent(&self, _favicon_url: &str) -> Result<IconAsset, IconError> {
        Ok(IconAsset {
            rgba: vec![0xFF; 4],
            width: 1,
            height: 1,
            accent_color: [0xFF, 0xFF, 0xFF],
        })
    }
}

struct NoopPrewarm;
impl PrewarmService for NoopPrewarm {
    fn prewarm(&self, _url: &str) {}
}

#[derive(Default)]
struct CountingStore {
    saves: AtomicUsize,
    loads: AtomicUsize,
}
impl MetadataStore for CountingStore {
    fn save(&self, _url: &str, _meta: &ResolvedMeta) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
    fn load_cached(&self, _url: &str) -> Option<ResolvedMeta> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        None
    }
}

struct NoopLauncher;
impl bubbleshell::BrowserLauncher for NoopLauncher {
    fn open_in_browser(&self, _url: &str, _options: LaunchOptions) {}
}

struct OpenGate;
impl OverlayGate for OpenGate {
    fn can_draw_overlays(&self) -> bool {
        true
    }
}

struct Harness {
    app: WebHeadApp,
    resolver: Arc<ScriptedResolver>,
    store: Arc<CountingStore>,
}

fn harness(resolver: ScriptedResolver) -> Harness {
    let resolver = Arc::new(resolver);
    let store = Arc::new(CountingStore::default());
    let app = WebHeadApp::start(
        WebHeadConfig::default(),
        Collaborators {
            resolver: resolver.clone(),
            icons: Arc::new(PixelIcons),
            prewarm: Arc::new(NoopPrewarm),
            store: store.clone(),
            launcher: Arc::new(NoopLauncher),
            overlay_gate: Arc::new(OpenGate),
        },
        tokio::runtime::Handle::current(),
    )
    .unwrap();
    Harness { app, resolver, store }
}

/// Tick the app until `done` holds or the attempt limit runs out.
async fn tick_until(app: &mut WebHeadApp, mut done: impl FnMut(&WebHeadApp) -> bool) -> bool {
    for _ in 0..200 {
        app.tick(DT);
        if done(app) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submission_delivers_meta_then_icon() {
    let mut h = harness(ScriptedResolver::ok());
    let id = h.app.open_url("https://news.example/story", HeadFlags::default()).unwrap();

    let delivered = tick_until(&mut h.app, |app| {
        app.head(&id).is_some_and(|head| head.icon.is_some())
    })
    .await;
    assert!(delivered, "fetch never completed");

    let head = h.app.head(&id).unwrap();
    // The icon never lands before the metadata that names it.
    let meta = head.meta.as_ref().expect("meta delivered before icon");
    assert_eq!(meta.title.as_deref(), Some("Title of https://news.example/story"));
    assert_eq!(head.display_title(), "Title of https://news.example/story");
    assert_eq!(head.icon.as_ref().unwrap().accent_color, [0xFF, 0xFF, 0xFF]);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_arriving_after_removal_is_discarded() {
    let (resolver, release) = ScriptedResolver::gated();
    let mut h = harness(resolver);
    let id = h.app.open_url("https://a.example", HeadFlags::default()).unwrap();

    // Head dies while its fetch is still blocked on the network.
    let events = h.app.remove(&id, RemovalCause::UserDismissed);
    assert!(events.contains(&GroupEvent::Empty));
    release.send(()).unwrap();

    // The late result drains through tick without resurrecting anything.
    tick_until(&mut h.app, |app| app.group.is_empty()).await;
    for _ in 0..20 {
        h.app.tick(DT);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.app.head(&id).is_none());
    assert!(h.app.group.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn incognito_head_never_touches_the_store() {
    let mut h = harness(ScriptedResolver::ok());
    let id = h
        .app
        .open_url(
            "https://private.example",
            HeadFlags {
                incognito: true,
                from_amp: false,
            },
        )
        .unwrap();

    let delivered = tick_until(&mut h.app, |app| {
        app.head(&id).is_some_and(|head| head.meta.is_some())
    })
    .await;
    assert!(delivered);
    assert_eq!(h.store.loads.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_resolution_leaves_a_usable_bare_head() {
    let mut h = harness(ScriptedResolver::failing());
    let id = h.app.open_url("https://down.example", HeadFlags::default()).unwrap();

    let resolved = tick_until(&mut h.app, |_| {
        h.resolver.calls.load(Ordering::SeqCst) >= 1
    })
    .await;
    assert!(resolved);
    for _ in 0..20 {
        h.app.tick(DT);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let head = h.app.head(&id).unwrap();
    assert!(head.meta.is_none());
    assert!(head.icon.is_none());
    assert_eq!(head.display_title(), "https://down.example/");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_cancels_outstanding_fetches() {
    let (resolver, _release) = ScriptedResolver::gated();
    let mut h = harness(resolver);
    h.app.open_url("https://a.example", HeadFlags::default()).unwrap();
    h.app.open_url("https://b.example", HeadFlags::default()).unwrap();

    // Both fetches still blocked; teardown must not wait for them.
    let events = h.app.teardown();
    assert_eq!(events.last(), Some(&GroupEvent::Empty));
    assert!(h.app.group.is_empty());
    h.app.tick(DT);
    assert!(h.app.group.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resubmitting_an_open_url_is_rejected_not_refetched() {
    let (resolver, release) = ScriptedResolver::gated();
    let mut h = harness(resolver);
    h.app.open_url("https://a.example", HeadFlags::default()).unwrap();
    assert!(h.app.open_url("https://a.example", HeadFlags::default()).is_err());

    release.send(()).unwrap();
    tick_until(&mut h.app, |app| {
        app.head("https://a.example/").is_some_and(|head| head.meta.is_some())
    })
    .await;
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
}
