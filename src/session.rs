//! Single-file and batch dispatch.
//!
//! A [`Session`] is what a front end talks to. Handing it a set of files
//! filters them through the acceptor, then extracts a single file directly
//! or runs a batch when there are several. Each new request resets the
//! session first, which cancels whatever was still running and revokes the
//! preview handles of the previous outcome.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use endframe::{
//!     Delivery, ExtractOptions, FfmpegBackend, FrameExtractor, HandleRegistry, Session,
//!     SessionOutcome, VideoFile,
//! };
//!
//! # async fn example() -> Result<(), endframe::EndframeError> {
//! let registry = HandleRegistry::new();
//! let extractor = FrameExtractor::new(
//!     FfmpegBackend::shared(registry.clone()),
//!     registry,
//!     ExtractOptions::new(),
//! );
//! let session = Session::new(extractor, Arc::new(Delivery::new()));
//!
//! match session.process(vec![VideoFile::new("clip.mov")], 3, false).await? {
//!     SessionOutcome::Single(frames) => println!("{} frame(s)", frames.len()),
//!     SessionOutcome::Batch(board) => println!("{}%", board.progress().percentage),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::unbounded_channel;

use crate::{
    acceptor::{VideoFile, partition_acceptable},
    artifact::ExtractionResult,
    batch::{BatchBoard, BatchEvent, BatchRunner},
    configuration::ExtractOptions,
    delivery::Delivery,
    error::EndframeError,
    extractor::FrameExtractor,
    handle::{HandleRegistry, ResourceHandle},
    progress::CancellationToken,
};

/// What [`Session::process`] produced.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// Exactly one acceptable file was given; all of its frames.
    Single(Vec<ExtractionResult>),
    /// Several acceptable files were given; the final batch state.
    Batch(BatchBoard),
}

/// Front-end facing entry point tying extraction, batching, and delivery
/// together.
pub struct Session {
    extractor: FrameExtractor,
    delivery: Arc<Delivery>,
    token: Mutex<CancellationToken>,
    retained: Mutex<Vec<ResourceHandle>>,
}

impl Session {
    /// Create a session extracting with `extractor` and delivering through
    /// `delivery`.
    pub fn new(extractor: FrameExtractor, delivery: Arc<Delivery>) -> Self {
        Self {
            extractor,
            delivery,
            token: Mutex::new(CancellationToken::new()),
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Registry the session's handles live in.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        self.extractor.registry()
    }

    /// Token governing the current run. Cancelling it has the same effect
    /// on in-flight work as [`reset`](Session::reset).
    pub fn cancellation_token(&self) -> CancellationToken {
        lock(&self.token).clone()
    }

    /// Cancel in-flight work and revoke the previews of the last outcome.
    ///
    /// Later calls run under a fresh token.
    pub fn reset(&self) {
        let previous = std::mem::take(&mut *lock(&self.token));
        previous.cancel();

        let retained = std::mem::take(&mut *lock(&self.retained));
        let registry = self.registry();
        for handle in &retained {
            registry.revoke(handle);
        }
        log::debug!("Session reset, {} preview(s) revoked", retained.len());
    }

    /// Reset, filter `files`, then extract one file or run a batch.
    ///
    /// # Errors
    ///
    /// [`EndframeError::NoAcceptableFiles`] when no file passes the acceptor.
    /// In single mode, any extraction error. Batch mode reports per-item
    /// failures on the board instead.
    pub async fn process(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
    ) -> Result<SessionOutcome, EndframeError> {
        self.process_with(files, frame_count, auto_deliver, |_, _| {})
            .await
    }

    /// Same as [`process`](Session::process), calling `observer` after each
    /// batch event in batch mode.
    pub async fn process_with<F>(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
        observer: F,
    ) -> Result<SessionOutcome, EndframeError>
    where
        F: FnMut(&BatchBoard, &BatchEvent),
    {
        self.reset();

        let (mut accepted, rejected) = partition_acceptable(files);
        for file in &rejected {
            log::warn!("Skipping {file}: not a recognised video file");
        }

        match accepted.len() {
            0 => Err(EndframeError::NoAcceptableFiles),
            1 => {
                let file = accepted.remove(0);
                let results = self.extract_single(&file, frame_count, auto_deliver).await?;
                Ok(SessionOutcome::Single(results))
            }
            _ => {
                let board = self
                    .run_batch_with(accepted, frame_count, auto_deliver, observer)
                    .await;
                Ok(SessionOutcome::Batch(board))
            }
        }
    }

    /// Extract frames from one file under the session's token, delivering
    /// every frame when `auto_deliver` is set.
    pub async fn extract_single(
        &self,
        file: &VideoFile,
        frame_count: usize,
        auto_deliver: bool,
    ) -> Result<Vec<ExtractionResult>, EndframeError> {
        let options = self.run_options();
        let results = self
            .extractor
            .extract_with_options(file, frame_count, &options)
            .await?;

        if auto_deliver {
            for result in &results {
                self.deliver_result(result);
            }
        }
        self.retain(results.iter());
        Ok(results)
    }

    /// Run a batch under the session's token.
    pub async fn run_batch(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
    ) -> BatchBoard {
        self.run_batch_with(files, frame_count, auto_deliver, |_, _| {})
            .await
    }

    /// Run a batch, calling `observer` after each event is applied.
    pub async fn run_batch_with<F>(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
        observer: F,
    ) -> BatchBoard
    where
        F: FnMut(&BatchBoard, &BatchEvent),
    {
        let options = self.run_options();
        let runner = BatchRunner::new(self.extractor.clone(), Arc::clone(&self.delivery));
        let (sender, receiver) = unbounded_channel();
        let mut board = BatchBoard::new();

        tokio::join!(
            runner.run_with_options(files, frame_count, auto_deliver, &options, sender),
            board.follow(receiver, observer),
        );

        self.retain(board.items().iter().filter_map(|item| item.result()));
        board
    }

    /// Deliver one result on demand.
    pub fn deliver_result(&self, result: &ExtractionResult) -> Option<&'static str> {
        self.delivery.deliver(result.image_arc(), result.file_name())
    }

    /// Revoke the preview handles of `results`.
    pub fn release_results(&self, results: &[ExtractionResult]) {
        let registry = self.registry();
        for result in results {
            result.release(registry);
        }
    }

    fn run_options(&self) -> ExtractOptions {
        self.extractor
            .options()
            .clone()
            .with_cancellation(self.cancellation_token())
    }

    fn retain<'a>(&self, results: impl Iterator<Item = &'a ExtractionResult>) {
        lock(&self.retained).extend(results.map(|result| result.preview_handle().clone()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
