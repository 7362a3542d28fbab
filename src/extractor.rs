//! End-of-video frame extraction.
//!
//! [`FrameExtractor`] drives one [`MediaResource`] per call through
//! load, duration resolution, a seek/capture loop, and cleanup:
//!
//! ```text
//! INIT -> AWAITING_READY -> SEEKING(0) -> CAPTURING(0) -> SEEKING(1) -> ... -> DONE
//!            \________________________\___________________\____________-> FAILED
//! ```
//!
//! Every wait is bounded. Readiness is bounded by
//! [`ExtractOptions::with_ready_timeout`], each seek is raced against
//! [`ExtractOptions::with_seek_timeout`], and a cancellation token (if any) is
//! raced against both. Whatever the exit path, the source handle is revoked
//! and the resource's listeners are detached before the call returns.
//!
//! # Example
//!
//! ```no_run
//! use endframe::{ExtractOptions, FfmpegBackend, FrameExtractor, HandleRegistry, VideoFile};
//!
//! # async fn example() -> Result<(), endframe::EndframeError> {
//! let registry = HandleRegistry::new();
//! let backend = FfmpegBackend::shared(registry.clone());
//! let extractor = FrameExtractor::new(backend, registry.clone(), ExtractOptions::new());
//!
//! let frames = extractor.extract(&VideoFile::new("clip.mov"), 2).await?;
//! for frame in &frames {
//!     std::fs::write(frame.file_name(), frame.image_data())?;
//!     frame.release(&registry);
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
};

use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{Instant, sleep, sleep_until},
};

use crate::{
    acceptor::{VideoFile, is_acceptable},
    artifact::{ExtractionResult, artifact_file_name, target_timestamp},
    configuration::ExtractOptions,
    error::EndframeError,
    handle::{HandleRegistry, HandleTarget},
    media::{MediaBackend, MediaEvent, MediaResource},
    surface::Surface,
};

/// Out-of-range position that makes hosts compute a real duration for
/// streams that initially report an unbounded one.
const DURATION_PROBE_POSITION: f64 = 1e101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractionState {
    AwaitingReady,
    Seeking(usize),
    Capturing(usize),
    Done,
    Failed,
}

impl Display for ExtractionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExtractionState::AwaitingReady => f.write_str("AWAITING_READY"),
            ExtractionState::Seeking(index) => write!(f, "SEEKING({index})"),
            ExtractionState::Capturing(index) => write!(f, "CAPTURING({index})"),
            ExtractionState::Done => f.write_str("DONE"),
            ExtractionState::Failed => f.write_str("FAILED"),
        }
    }
}

/// How a seek wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekSettlement {
    Seeked,
    TimedOut,
}

/// Extracts the last frames of a video through a [`MediaBackend`].
///
/// Cheap to share: the backend and registry sit behind [`Arc`]s. Each
/// [`extract`](FrameExtractor::extract) call owns its own media resource and
/// surface.
#[derive(Clone)]
pub struct FrameExtractor {
    backend: Arc<dyn MediaBackend>,
    registry: Arc<HandleRegistry>,
    options: ExtractOptions,
}

impl FrameExtractor {
    /// Create an extractor that decodes through `backend` and allocates
    /// handles from `registry`.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        registry: Arc<HandleRegistry>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            backend,
            registry,
            options,
        }
    }

    /// Default options used by [`extract`](FrameExtractor::extract).
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Registry that source and preview handles are allocated from.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Extract `frame_count` frames from the end of `file`.
    ///
    /// Resolves with exactly `frame_count` results ordered from the end of
    /// the video backwards, or fails as a whole. Preview handles of the
    /// returned results are live; release them when done.
    ///
    /// # Errors
    ///
    /// - [`EndframeError::UnsupportedFile`] if the acceptor rejects `file`.
    /// - [`EndframeError::InvalidFrameCount`] if `frame_count` is zero.
    /// - [`EndframeError::DecodeError`] if the resource fails to load, never
    ///   reports a usable duration, or errors while seeking.
    /// - [`EndframeError::CaptureError`] if rasterising or encoding fails.
    /// - [`EndframeError::Cancelled`] if the configured token is cancelled.
    pub async fn extract(
        &self,
        file: &VideoFile,
        frame_count: usize,
    ) -> Result<Vec<ExtractionResult>, EndframeError> {
        self.extract_with_options(file, frame_count, &self.options)
            .await
    }

    /// Same as [`extract`](FrameExtractor::extract) with explicit options.
    pub async fn extract_with_options(
        &self,
        file: &VideoFile,
        frame_count: usize,
        options: &ExtractOptions,
    ) -> Result<Vec<ExtractionResult>, EndframeError> {
        if !is_acceptable(file) {
            return Err(EndframeError::UnsupportedFile {
                path: file.path().to_path_buf(),
            });
        }
        if frame_count == 0 {
            return Err(EndframeError::InvalidFrameCount(frame_count));
        }
        if options.is_cancelled() {
            return Err(EndframeError::Cancelled);
        }

        // INIT
        let source = self
            .registry
            .allocate(HandleTarget::File(file.path().to_path_buf()));
        let mut resource = self.backend.create_resource();
        resource.configure(options.playback);
        let events = resource.subscribe();
        resource.load(&source);
        log::debug!(
            "Extracting {frame_count} frame(s) from {} via {source}",
            file.name()
        );

        let mut run = ExtractionRun {
            file,
            frame_count,
            options,
            registry: &self.registry,
            resource,
            events,
            results: Vec::new(),
        };
        let outcome = run.drive().await;
        let results = run.teardown();
        self.registry.revoke(&source);

        match outcome {
            Ok(()) => {
                log::debug!("{}: {}", file.name(), ExtractionState::Done);
                Ok(results)
            }
            Err(error) => {
                log::debug!("{}: {} ({error})", file.name(), ExtractionState::Failed);
                for result in &results {
                    result.release(&self.registry);
                }
                Err(error)
            }
        }
    }
}

/// State of one in-flight extraction.
struct ExtractionRun<'a> {
    file: &'a VideoFile,
    frame_count: usize,
    options: &'a ExtractOptions,
    registry: &'a HandleRegistry,
    resource: Box<dyn MediaResource>,
    events: UnboundedReceiver<MediaEvent>,
    results: Vec<ExtractionResult>,
}

impl ExtractionRun<'_> {
    async fn drive(&mut self) -> Result<(), EndframeError> {
        self.enter(ExtractionState::AwaitingReady);
        let duration = self.await_ready().await?;

        let epsilon = self.options.end_epsilon.as_secs_f64();
        let stride = self.options.frame_stride.as_secs_f64();

        for index in 0..self.frame_count {
            if self.options.is_cancelled() {
                return Err(EndframeError::Cancelled);
            }

            self.enter(ExtractionState::Seeking(index));
            let target = target_timestamp(duration, index, epsilon, stride);
            let settlement = self.seek(target).await?;
            if settlement == SeekSettlement::TimedOut {
                log::warn!(
                    "{}: no seek completion for {target:.3}s within {:?}, capturing anyway",
                    self.file.name(),
                    self.options.seek_timeout
                );
            }

            self.enter(ExtractionState::Capturing(index));
            let result = self.capture(index, target, duration).await?;
            self.results.push(result);
        }

        Ok(())
    }

    /// Wait for the first readiness signal that comes with a finite,
    /// non-zero duration.
    async fn await_ready(&mut self) -> Result<f64, EndframeError> {
        let deadline = Instant::now() + self.options.ready_timeout;
        let mut probing_duration = false;

        loop {
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = sleep_until(deadline) => {
                    let reason = if probing_duration {
                        "timed out while resolving an unbounded duration"
                    } else {
                        "timed out waiting for video metadata"
                    };
                    return Err(EndframeError::decode(self.file.name(), reason));
                }
                _ = self.options.cancelled() => return Err(EndframeError::Cancelled),
            };

            match event {
                Some(MediaEvent::Error(reason)) => {
                    return Err(EndframeError::decode(self.file.name(), reason));
                }
                Some(event) if event.is_readiness_signal() => {}
                Some(_) => continue,
                None => {
                    return Err(EndframeError::decode(
                        self.file.name(),
                        "media pipeline closed before the video became ready",
                    ));
                }
            }

            let duration = self.resource.duration();
            if duration == f64::INFINITY {
                if !probing_duration {
                    log::debug!(
                        "{}: duration reported as unbounded, probing the end of stream",
                        self.file.name()
                    );
                    probing_duration = true;
                    self.resource.seek(DURATION_PROBE_POSITION);
                }
                continue;
            }

            if duration.is_finite() && duration > 0.0 {
                if probing_duration {
                    self.resource.seek(0.0);
                }
                log::debug!("{}: ready, duration {duration:.3}s", self.file.name());
                return Ok(duration);
            }
        }
    }

    /// Request a seek and wait for its completion event or the timeout,
    /// whichever comes first.
    async fn seek(&mut self, target: f64) -> Result<SeekSettlement, EndframeError> {
        let ticket = self.resource.seek(target);
        let timeout = sleep(self.options.seek_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(MediaEvent::Seeked { ticket: completed }) if completed == ticket => {
                        return Ok(SeekSettlement::Seeked);
                    }
                    Some(MediaEvent::Error(reason)) => {
                        return Err(EndframeError::decode(self.file.name(), reason));
                    }
                    Some(other) => {
                        log::trace!("{}: ignoring {other:?} while seeking", self.file.name());
                    }
                    None => {
                        return Err(EndframeError::decode(
                            self.file.name(),
                            "media pipeline closed during a seek",
                        ));
                    }
                },
                _ = &mut timeout => return Ok(SeekSettlement::TimedOut),
                _ = self.options.cancelled() => return Err(EndframeError::Cancelled),
            }
        }
    }

    async fn capture(
        &mut self,
        index: usize,
        target: f64,
        duration: f64,
    ) -> Result<ExtractionResult, EndframeError> {
        let name = self.file.name();
        let (width, height) = self.resource.video_dimensions();
        let mut surface = Surface::new(width, height).ok_or_else(|| {
            EndframeError::capture(
                name,
                format!("could not obtain a {width}x{height} rasterization surface"),
            )
        })?;
        self.resource
            .draw_frame(&mut surface)
            .map_err(|reason| EndframeError::capture(name, reason))?;

        let encoded = tokio::task::spawn_blocking(move || surface.encode_png())
            .await
            .map_err(|error| EndframeError::capture(name, format!("encoder task failed: {error}")))?
            .map_err(|error| EndframeError::capture(name, error.to_string()))?;
        let image_data: Arc<[u8]> = Arc::from(encoded);

        let timestamp = settled_timestamp(
            self.resource.current_time(),
            target,
            duration,
            self.results.last().map(ExtractionResult::timestamp),
        );
        let preview = self
            .registry
            .allocate(HandleTarget::Bytes(Arc::clone(&image_data)));
        let file_name = artifact_file_name(self.file.base_name(), self.frame_count, index);

        log::debug!("{name}: captured {file_name} at {timestamp:.3}s");
        Ok(ExtractionResult::new(image_data, preview, file_name, timestamp))
    }

    fn enter(&self, state: ExtractionState) {
        log::trace!("{}: {state}", self.file.name());
    }

    /// Detach listeners and stop the resource, handing back what was captured.
    fn teardown(mut self) -> Vec<ExtractionResult> {
        self.resource.unsubscribe();
        self.resource.release();
        self.events.close();
        self.results
    }
}

/// Position a frame was captured at: the resource's own report when it has
/// one, kept within `[0, duration]` and never later than the previous frame.
fn settled_timestamp(reported: f64, target: f64, duration: f64, previous: Option<f64>) -> f64 {
    let position = if reported.is_finite() { reported } else { target };
    let ceiling = previous.map_or(duration, |previous| previous.min(duration));
    position.clamp(0.0, ceiling.max(0.0))
}
