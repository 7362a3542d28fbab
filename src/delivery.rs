//! Artifact delivery.
//!
//! Getting an encoded frame in front of the user depends on what the host
//! offers. [`Delivery`] holds a ranked list of [`DeliveryStrategy`]s and tries
//! them in order until one succeeds:
//!
//! 1. [`ShareStrategy`]: the host's share capability, if it accepts the file.
//! 2. [`NewContextStrategy`]: on hosts that ignore download hints, open the
//!    artifact in a new browsing context, or navigate to it in place.
//! 3. [`DownloadStrategy`]: hand a temporary handle to a [`DownloadSink`].
//!
//! Delivery is fire-and-forget. Failures are logged and fall through to the
//! next strategy, and nothing is returned to the caller but the name of the
//! strategy that worked. Every handle a strategy allocates is revoked on
//! every path; successful paths revoke after a short delay so the consumer
//! can finish reading first.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use endframe::{Delivery, DirectorySink, DownloadStrategy, HandleRegistry};
//!
//! let registry = HandleRegistry::new();
//! let sink = DirectorySink::new("frames", registry.clone());
//! let delivery = Delivery::new()
//!     .with_strategy(DownloadStrategy::new(Arc::new(sink), registry, Duration::from_millis(150)));
//!
//! delivery.deliver(Arc::from(&b"\x89PNG"[..]), "clip_end.png");
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    error::DeliveryError,
    handle::{HandleRegistry, HandleTarget, ResourceHandle},
    platform::PlatformProfile,
    surface::ARTIFACT_MEDIA_TYPE,
};

/// A named binary image ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    data: Arc<[u8]>,
    file_name: String,
}

impl Artifact {
    /// Wrap encoded image bytes under `file_name`.
    pub fn new(data: Arc<[u8]>, file_name: impl Into<String>) -> Self {
        Self {
            data,
            file_name: file_name.into(),
        }
    }

    /// Encoded bytes.
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    /// Name the user will see.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Media type of the bytes.
    pub fn media_type(&self) -> &'static str {
        ARTIFACT_MEDIA_TYPE
    }
}

/// One way of handing an artifact to the user.
pub trait DeliveryStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this strategy applies on the current host.
    fn can_attempt(&self, artifact: &Artifact) -> bool;

    /// Try to deliver. On error the next strategy is tried.
    fn attempt(&self, artifact: &Artifact) -> Result<(), DeliveryError>;
}

/// Tries delivery strategies in rank order.
#[derive(Default)]
pub struct Delivery {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl Delivery {
    /// Create a delivery with no strategies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy at the lowest rank so far.
    #[must_use]
    pub fn with_strategy<S: DeliveryStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Names of the configured strategies, highest rank first.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Deliver `data` as `file_name`.
    ///
    /// Returns the name of the strategy that succeeded, or `None` if every
    /// applicable strategy failed. Failures are logged, never returned.
    pub fn deliver(&self, data: Arc<[u8]>, file_name: &str) -> Option<&'static str> {
        let artifact = Artifact::new(data, file_name);

        for strategy in &self.strategies {
            if !strategy.can_attempt(&artifact) {
                log::trace!("Skipping {} delivery for {file_name}", strategy.name());
                continue;
            }
            match strategy.attempt(&artifact) {
                Ok(()) => {
                    log::debug!("Delivered {file_name} via {}", strategy.name());
                    return Some(strategy.name());
                }
                Err(error) => {
                    log::warn!("{} delivery of {file_name} failed: {error}", strategy.name());
                }
            }
        }

        log::error!("No delivery strategy could deliver {file_name}");
        None
    }
}

/// Revoke `handle` after `delay` on the current Tokio runtime, or right away
/// when called outside one.
pub(crate) fn schedule_revoke(
    registry: &Arc<HandleRegistry>,
    handle: ResourceHandle,
    delay: Duration,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let registry = Arc::clone(registry);
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                registry.revoke(&handle);
            });
        }
        Err(_) => {
            registry.revoke(&handle);
        }
    }
}

// ── Share ──────────────────────────────────────────────────────────

/// A host share capability (e.g. a native share sheet).
pub trait ShareTarget: Send + Sync {
    /// Whether the host confirms it can share this artifact.
    fn can_share(&self, artifact: &Artifact) -> bool;

    /// Share the artifact. Must run within the user-intent context that
    /// triggered delivery, which is why delivery is synchronous.
    fn share(&self, artifact: &Artifact) -> Result<(), String>;
}

/// Delivers through a [`ShareTarget`].
pub struct ShareStrategy {
    target: Arc<dyn ShareTarget>,
}

impl ShareStrategy {
    /// Share through `target`.
    pub fn new(target: Arc<dyn ShareTarget>) -> Self {
        Self { target }
    }
}

impl DeliveryStrategy for ShareStrategy {
    fn name(&self) -> &'static str {
        "share"
    }

    fn can_attempt(&self, artifact: &Artifact) -> bool {
        self.target.can_share(artifact)
    }

    fn attempt(&self, artifact: &Artifact) -> Result<(), DeliveryError> {
        self.target
            .share(artifact)
            .map_err(DeliveryError::ShareFailed)
    }
}

// ── New browsing context ───────────────────────────────────────────

/// A host able to display a resource handle outside the current view.
pub trait BrowsingContext: Send + Sync {
    /// Open `handle` in a new context. Returns `false` if the host blocked it.
    fn open_in_new_context(&self, handle: &ResourceHandle) -> bool;

    /// Replace the current view with `handle`.
    fn navigate(&self, handle: &ResourceHandle) -> Result<(), String>;
}

/// Opens the artifact for the user to save by hand, on hosts that ignore
/// download hints.
pub struct NewContextStrategy {
    context: Arc<dyn BrowsingContext>,
    profile: PlatformProfile,
    registry: Arc<HandleRegistry>,
    revoke_delay: Duration,
}

impl NewContextStrategy {
    /// Open artifacts through `context` when `profile` calls for it.
    pub fn new(
        context: Arc<dyn BrowsingContext>,
        profile: PlatformProfile,
        registry: Arc<HandleRegistry>,
        revoke_delay: Duration,
    ) -> Self {
        Self {
            context,
            profile,
            registry,
            revoke_delay,
        }
    }
}

impl DeliveryStrategy for NewContextStrategy {
    fn name(&self) -> &'static str {
        "new-context"
    }

    fn can_attempt(&self, _artifact: &Artifact) -> bool {
        self.profile.ignores_download_hints()
    }

    fn attempt(&self, artifact: &Artifact) -> Result<(), DeliveryError> {
        let handle = self
            .registry
            .allocate(HandleTarget::Bytes(Arc::clone(artifact.data())));

        if self.context.open_in_new_context(&handle) {
            schedule_revoke(&self.registry, handle, self.revoke_delay);
            return Ok(());
        }

        log::debug!("New context blocked for {}, navigating in place", artifact.file_name());
        match self.context.navigate(&handle) {
            Ok(()) => {
                schedule_revoke(&self.registry, handle, self.revoke_delay);
                Ok(())
            }
            Err(reason) => {
                self.registry.revoke(&handle);
                Err(DeliveryError::NavigationBlocked(reason))
            }
        }
    }
}

// ── Download ───────────────────────────────────────────────────────

/// Receives a handle and a suggested file name, like a download link.
pub trait DownloadSink: Send + Sync {
    /// Read `handle` and store it as `file_name`.
    fn download(&self, handle: &ResourceHandle, file_name: &str) -> Result<(), DeliveryError>;
}

/// Delivers through a [`DownloadSink`]. Always applicable.
pub struct DownloadStrategy {
    sink: Arc<dyn DownloadSink>,
    registry: Arc<HandleRegistry>,
    revoke_delay: Duration,
}

impl DownloadStrategy {
    /// Download into `sink`, revoking the temporary handle `revoke_delay`
    /// after a successful hand-off.
    pub fn new(
        sink: Arc<dyn DownloadSink>,
        registry: Arc<HandleRegistry>,
        revoke_delay: Duration,
    ) -> Self {
        Self {
            sink,
            registry,
            revoke_delay,
        }
    }
}

impl DeliveryStrategy for DownloadStrategy {
    fn name(&self) -> &'static str {
        "download"
    }

    fn can_attempt(&self, _artifact: &Artifact) -> bool {
        true
    }

    fn attempt(&self, artifact: &Artifact) -> Result<(), DeliveryError> {
        let handle = self
            .registry
            .allocate(HandleTarget::Bytes(Arc::clone(artifact.data())));

        match self.sink.download(&handle, artifact.file_name()) {
            Ok(()) => {
                schedule_revoke(&self.registry, handle, self.revoke_delay);
                Ok(())
            }
            Err(error) => {
                self.registry.revoke(&handle);
                Err(error)
            }
        }
    }
}

/// A [`DownloadSink`] that writes into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
    registry: Arc<HandleRegistry>,
    overwrite: bool,
}

impl DirectorySink {
    /// Write downloads into `directory`, refusing to replace existing files.
    pub fn new<P: AsRef<Path>>(directory: P, registry: Arc<HandleRegistry>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            registry,
            overwrite: false,
        }
    }

    /// Allow replacing files that already exist.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Target directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl DownloadSink for DirectorySink {
    fn download(&self, handle: &ResourceHandle, file_name: &str) -> Result<(), DeliveryError> {
        let target = self
            .registry
            .resolve(handle)
            .ok_or_else(|| DeliveryError::HandleRevoked(handle.to_string()))?;

        let destination = self.directory.join(file_name);
        if !self.overwrite && destination.exists() {
            return Err(DeliveryError::AlreadyExists(destination));
        }
        fs::create_dir_all(&self.directory)?;

        match target {
            HandleTarget::Bytes(data) => fs::write(&destination, &data)?,
            HandleTarget::File(source) => {
                fs::copy(&source, &destination)?;
            }
        }
        log::debug!("Wrote {}", destination.display());
        Ok(())
    }
}
