//! Artifact delivery integration tests.

mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use endframe::{
    Artifact, BrowsingContext, Delivery, DirectorySink, DownloadSink, DownloadStrategy,
    HandleRegistry, HandleTarget, NewContextStrategy, PlatformProfile, ResourceHandle,
    ShareStrategy, ShareTarget,
};

use common::RecordingSink;

const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X)";
const REVOKE_DELAY: Duration = Duration::from_millis(150);

fn png() -> Arc<[u8]> {
    Arc::from(&b"\x89PNG\r\n\x1a\nfake"[..])
}

#[derive(Default)]
struct RecordingShare {
    supported: bool,
    failure: Option<String>,
    shared: Mutex<Vec<String>>,
}

impl ShareTarget for RecordingShare {
    fn can_share(&self, artifact: &Artifact) -> bool {
        self.supported && artifact.media_type() == "image/png"
    }

    fn share(&self, artifact: &Artifact) -> Result<(), String> {
        self.shared.lock().unwrap().push(artifact.file_name().to_string());
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct RecordingContext {
    allow_new_context: bool,
    allow_navigation: bool,
    opened: Mutex<Vec<ResourceHandle>>,
    navigated: Mutex<Vec<ResourceHandle>>,
}

impl BrowsingContext for RecordingContext {
    fn open_in_new_context(&self, handle: &ResourceHandle) -> bool {
        if self.allow_new_context {
            self.opened.lock().unwrap().push(handle.clone());
        }
        self.allow_new_context
    }

    fn navigate(&self, handle: &ResourceHandle) -> Result<(), String> {
        if self.allow_navigation {
            self.navigated.lock().unwrap().push(handle.clone());
            Ok(())
        } else {
            Err("navigation blocked by popup policy".to_string())
        }
    }
}

fn ranked(
    share: Arc<RecordingShare>,
    context: Arc<RecordingContext>,
    profile: PlatformProfile,
    sink: Arc<RecordingSink>,
    registry: &Arc<HandleRegistry>,
) -> Delivery {
    Delivery::new()
        .with_strategy(ShareStrategy::new(share))
        .with_strategy(NewContextStrategy::new(
            context,
            profile,
            registry.clone(),
            REVOKE_DELAY,
        ))
        .with_strategy(DownloadStrategy::new(sink, registry.clone(), REVOKE_DELAY))
}

// ── Strategy ranking ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn share_wins_when_supported() {
    let registry = HandleRegistry::new();
    let share = Arc::new(RecordingShare {
        supported: true,
        ..RecordingShare::default()
    });
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = ranked(
        share.clone(),
        Arc::default(),
        PlatformProfile::desktop(),
        sink.clone(),
        &registry,
    );

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("share"));
    assert_eq!(*share.shared.lock().unwrap(), ["clip_end.png"]);
    assert!(sink.names().is_empty());
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_share_falls_through_to_download() {
    let registry = HandleRegistry::new();
    let share = Arc::new(RecordingShare {
        supported: true,
        failure: Some("AbortError".to_string()),
        ..RecordingShare::default()
    });
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = ranked(
        share.clone(),
        Arc::default(),
        PlatformProfile::desktop(),
        sink.clone(),
        &registry,
    );

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("download"));
    assert_eq!(share.shared.lock().unwrap().len(), 1);
    assert_eq!(sink.names(), ["clip_end.png"]);
}

#[tokio::test(start_paused = true)]
async fn handhelds_open_a_new_context_instead_of_downloading() {
    let registry = HandleRegistry::new();
    let context = Arc::new(RecordingContext {
        allow_new_context: true,
        ..RecordingContext::default()
    });
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = ranked(
        Arc::default(),
        context.clone(),
        PlatformProfile::new(IPHONE, 5),
        sink.clone(),
        &registry,
    );

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("new-context"));
    assert_eq!(context.opened.lock().unwrap().len(), 1);
    assert!(sink.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn blocked_new_context_navigates_in_place() {
    let registry = HandleRegistry::new();
    let context = Arc::new(RecordingContext {
        allow_navigation: true,
        ..RecordingContext::default()
    });
    let delivery = ranked(
        Arc::default(),
        context.clone(),
        PlatformProfile::new(IPHONE, 5),
        Arc::new(RecordingSink::new(registry.clone())),
        &registry,
    );

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("new-context"));
    assert!(context.opened.lock().unwrap().is_empty());
    assert_eq!(context.navigated.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fully_blocked_handheld_still_downloads() {
    let registry = HandleRegistry::new();
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = ranked(
        Arc::default(),
        Arc::default(),
        PlatformProfile::new(IPHONE, 5),
        sink.clone(),
        &registry,
    );

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("download"));
    assert_eq!(sink.names(), ["clip_end.png"]);
}

#[tokio::test]
async fn total_failure_is_not_an_error() {
    let registry = HandleRegistry::new();
    let delivery = Delivery::new().with_strategy(DownloadStrategy::new(
        Arc::new(RecordingSink::failing(registry.clone(), "disk full")),
        registry.clone(),
        REVOKE_DELAY,
    ));

    assert_eq!(delivery.deliver(png(), "clip_end.png"), None);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn strategies_keep_their_rank() {
    let registry = HandleRegistry::new();
    let delivery = ranked(
        Arc::default(),
        Arc::default(),
        PlatformProfile::desktop(),
        Arc::new(RecordingSink::new(registry.clone())),
        &registry,
    );
    assert_eq!(delivery.strategy_names(), ["share", "new-context", "download"]);
}

// ── Handle revocation ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn download_handles_are_revoked_after_the_delay() {
    let registry = HandleRegistry::new();
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = Delivery::new().with_strategy(DownloadStrategy::new(
        sink,
        registry.clone(),
        REVOKE_DELAY,
    ));

    delivery.deliver(png(), "clip_end.png");
    assert_eq!(registry.live_count(), 1, "revocation is deferred");

    tokio::time::sleep(REVOKE_DELAY + Duration::from_millis(10)).await;
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn new_context_handles_are_revoked_on_every_path() {
    let registry = HandleRegistry::new();
    let blocked = Arc::new(RecordingContext::default());
    let strategy_delivery = Delivery::new().with_strategy(NewContextStrategy::new(
        blocked,
        PlatformProfile::new(IPHONE, 5),
        registry.clone(),
        REVOKE_DELAY,
    ));

    assert_eq!(strategy_delivery.deliver(png(), "clip_end.png"), None);
    assert_eq!(registry.live_count(), 0, "failed attempts revoke at once");

    let open = Arc::new(RecordingContext {
        allow_new_context: true,
        ..RecordingContext::default()
    });
    let delivery = Delivery::new().with_strategy(NewContextStrategy::new(
        open,
        PlatformProfile::new(IPHONE, 5),
        registry.clone(),
        REVOKE_DELAY,
    ));
    delivery.deliver(png(), "clip_end.png");
    tokio::time::sleep(REVOKE_DELAY * 2).await;
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn handles_are_revoked_immediately_outside_a_runtime() {
    let registry = HandleRegistry::new();
    let sink = Arc::new(RecordingSink::new(registry.clone()));
    let delivery = Delivery::new().with_strategy(DownloadStrategy::new(
        sink.clone(),
        registry.clone(),
        REVOKE_DELAY,
    ));

    assert_eq!(delivery.deliver(png(), "clip_end.png"), Some("download"));
    assert_eq!(sink.names(), ["clip_end.png"]);
    assert_eq!(registry.live_count(), 0);
}

// ── DirectorySink ──────────────────────────────────────────────────

#[test]
fn directory_sink_writes_bytes() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = HandleRegistry::new();
    let sink = DirectorySink::new(directory.path().join("stills"), registry.clone());
    let handle = registry.allocate(HandleTarget::Bytes(png()));

    sink.download(&handle, "clip_end.png").expect("download");

    let written = std::fs::read(directory.path().join("stills/clip_end.png")).unwrap();
    assert_eq!(written, &*png());
}

#[test]
fn directory_sink_refuses_to_overwrite_by_default() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(directory.path().join("clip_end.png"), b"old").unwrap();
    let registry = HandleRegistry::new();
    let handle = registry.allocate(HandleTarget::Bytes(png()));

    let refusing = DirectorySink::new(directory.path(), registry.clone());
    assert!(refusing.download(&handle, "clip_end.png").is_err());
    assert_eq!(std::fs::read(directory.path().join("clip_end.png")).unwrap(), b"old");

    let overwriting = DirectorySink::new(directory.path(), registry.clone()).with_overwrite(true);
    overwriting.download(&handle, "clip_end.png").expect("download");
    assert_eq!(
        std::fs::read(directory.path().join("clip_end.png")).unwrap(),
        &*png()
    );
}

#[test]
fn directory_sink_rejects_revoked_handles() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let registry = HandleRegistry::new();
    let handle = registry.allocate(HandleTarget::Bytes(png()));
    registry.revoke(&handle);

    let sink = DirectorySink::new(directory.path(), registry);
    let error = sink.download(&handle, "clip_end.png").unwrap_err();
    assert!(error.to_string().contains("revoked"));
}
