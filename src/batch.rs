//! Sequential batch extraction.
//!
//! [`BatchRunner`] walks a list of files strictly in order, one extraction at
//! a time, and reports every status change as a [`BatchEvent`] on a channel.
//! [`BatchBoard`] is the single owner of batch state: it applies those events
//! in arrival order, so no item is ever updated from two places at once.
//!
//! A failing file marks its own item `ERROR` and the batch moves on.
//! Decoding runs one file at a time because concurrent decodes of large
//! files can exhaust memory and hardware decoder slots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use endframe::{
//!     BatchBoard, BatchRunner, Delivery, ExtractOptions, FfmpegBackend, FrameExtractor,
//!     HandleRegistry, VideoFile,
//! };
//!
//! # async fn example() {
//! let registry = HandleRegistry::new();
//! let extractor = FrameExtractor::new(
//!     FfmpegBackend::shared(registry.clone()),
//!     registry,
//!     ExtractOptions::new(),
//! );
//! let runner = BatchRunner::new(extractor, Arc::new(Delivery::new()));
//!
//! let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
//! let files = vec![VideoFile::new("a.mp4"), VideoFile::new("b.mkv")];
//! let mut board = BatchBoard::new();
//! tokio::join!(
//!     runner.run(files, 1, false, sender),
//!     board.follow(receiver, |board, _| println!("{}%", board.progress().percentage)),
//! );
//! # }
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    acceptor::VideoFile,
    artifact::ExtractionResult,
    configuration::ExtractOptions,
    delivery::Delivery,
    error::EndframeError,
    extractor::FrameExtractor,
    handle::HandleRegistry,
    progress::BatchProgress,
};

/// Where an item is in its lifecycle.
///
/// `Pending -> Processing -> Completed | Error`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchItemStatus {
    /// Waiting for its turn.
    Pending,
    /// Being extracted.
    Processing,
    /// Extracted successfully.
    Completed,
    /// Extraction failed.
    Error,
}

impl BatchItemStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchItemStatus::Completed | BatchItemStatus::Error)
    }
}

impl Display for BatchItemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            BatchItemStatus::Pending => "PENDING",
            BatchItemStatus::Processing => "PROCESSING",
            BatchItemStatus::Completed => "COMPLETED",
            BatchItemStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One file's slot in a batch.
///
/// A result is present exactly when the status is `Completed`, an error
/// message exactly when it is `Error`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    id: String,
    file: VideoFile,
    status: BatchItemStatus,
    result: Option<ExtractionResult>,
    error: Option<String>,
}

impl BatchItem {
    fn pending(id: String, file: VideoFile) -> Self {
        Self {
            id,
            file,
            status: BatchItemStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Identifier, unique within the batch.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The input file.
    pub fn file(&self) -> &VideoFile {
        &self.file
    }

    /// Current status.
    pub fn status(&self) -> BatchItemStatus {
        self.status
    }

    /// The first extracted frame, once completed.
    pub fn result(&self) -> Option<&ExtractionResult> {
        self.result.as_ref()
    }

    /// Failure message, once failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A status change emitted by [`BatchRunner`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The batch was created with every item pending.
    Started {
        /// Items in input order.
        items: Vec<BatchItem>,
    },
    /// Item `index` started extracting.
    ItemProcessing {
        /// Position in the batch.
        index: usize,
    },
    /// Item `index` completed with its first frame.
    ItemCompleted {
        /// Position in the batch.
        index: usize,
        /// The item's representative frame.
        result: ExtractionResult,
    },
    /// Item `index` failed.
    ItemFailed {
        /// Position in the batch.
        index: usize,
        /// Human-readable reason.
        error: String,
    },
    /// No further events follow.
    Finished,
}

/// The authoritative view of a batch, built by applying [`BatchEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct BatchBoard {
    items: Vec<BatchItem>,
    processing: bool,
}

impl BatchBoard {
    /// Create an empty, idle board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in input order.
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Whether the batch is still running.
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Current progress.
    pub fn progress(&self) -> BatchProgress {
        let completed = self.count(BatchItemStatus::Completed);
        let failed = self.count(BatchItemStatus::Error);
        BatchProgress::from_counts(self.items.len(), completed, failed)
    }

    /// Apply one event. Events that would break the item lifecycle are
    /// logged and ignored.
    pub fn apply(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Started { items } => {
                self.items = items.clone();
                self.processing = true;
            }
            BatchEvent::ItemProcessing { index } => {
                if let Some(item) = self.transition(*index, BatchItemStatus::Processing) {
                    log::debug!("Batch item {} processing", item.id);
                }
            }
            BatchEvent::ItemCompleted { index, result } => {
                if let Some(item) = self.transition(*index, BatchItemStatus::Completed) {
                    item.result = Some(result.clone());
                }
            }
            BatchEvent::ItemFailed { index, error } => {
                if let Some(item) = self.transition(*index, BatchItemStatus::Error) {
                    item.error = Some(error.clone());
                }
            }
            BatchEvent::Finished => self.processing = false,
        }
    }

    /// Apply events from `events` until the batch finishes or the sender is
    /// dropped, calling `observer` after each one.
    pub async fn follow<F>(&mut self, mut events: UnboundedReceiver<BatchEvent>, mut observer: F)
    where
        F: FnMut(&BatchBoard, &BatchEvent),
    {
        while let Some(event) = events.recv().await {
            self.apply(&event);
            observer(self, &event);
            if event == BatchEvent::Finished {
                break;
            }
        }
        self.processing = false;
    }

    /// Revoke the preview handles of every completed item.
    pub fn release_results(&self, registry: &HandleRegistry) {
        for result in self.items.iter().filter_map(BatchItem::result) {
            result.release(registry);
        }
    }

    fn count(&self, status: BatchItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    fn transition(&mut self, index: usize, to: BatchItemStatus) -> Option<&mut BatchItem> {
        let Some(item) = self.items.get_mut(index) else {
            log::warn!("Ignoring {to} for unknown batch item {index}");
            return None;
        };
        let allowed = match to {
            BatchItemStatus::Processing => item.status == BatchItemStatus::Pending,
            BatchItemStatus::Completed | BatchItemStatus::Error => {
                item.status == BatchItemStatus::Processing
            }
            BatchItemStatus::Pending => false,
        };
        if !allowed {
            log::warn!("Ignoring {} -> {to} for batch item {}", item.status, item.id);
            return None;
        }
        item.status = to;
        Some(item)
    }
}

/// Runs batch extractions, one file at a time.
#[derive(Clone)]
pub struct BatchRunner {
    extractor: FrameExtractor,
    delivery: Arc<Delivery>,
}

impl BatchRunner {
    /// Create a runner that extracts with `extractor` and, when asked,
    /// auto-delivers through `delivery`.
    pub fn new(extractor: FrameExtractor, delivery: Arc<Delivery>) -> Self {
        Self {
            extractor,
            delivery,
        }
    }

    /// Run a batch with the extractor's own options.
    ///
    /// See [`run_with_options`](BatchRunner::run_with_options).
    pub async fn run(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
        events: UnboundedSender<BatchEvent>,
    ) {
        let options = self.extractor.options().clone();
        self.run_with_options(files, frame_count, auto_deliver, &options, events)
            .await;
    }

    /// Extract `frame_count` frames from each file in order, emitting a
    /// [`BatchEvent`] for every status change and [`BatchEvent::Finished`]
    /// last.
    ///
    /// Each completed item keeps its first frame. With `auto_deliver`, every
    /// frame of the item is delivered. Preview handles of frames that are not
    /// kept are revoked right away.
    ///
    /// If `options` carries a cancelled token, the in-flight item fails with
    /// [`EndframeError::Cancelled`] and later items stay pending.
    pub async fn run_with_options(
        &self,
        files: Vec<VideoFile>,
        frame_count: usize,
        auto_deliver: bool,
        options: &ExtractOptions,
        events: UnboundedSender<BatchEvent>,
    ) {
        let batch_started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        let items: Vec<BatchItem> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| BatchItem::pending(format!("batch-{index}-{batch_started}"), file))
            .collect();
        let files: Vec<VideoFile> = items.iter().map(|item| item.file.clone()).collect();
        log::info!("Starting batch of {} file(s)", files.len());
        send(&events, BatchEvent::Started { items });

        for (index, file) in files.iter().enumerate() {
            if options.is_cancelled() {
                log::info!("Batch cancelled before {file}");
                break;
            }
            send(&events, BatchEvent::ItemProcessing { index });

            match self
                .extractor
                .extract_with_options(file, frame_count, options)
                .await
            {
                Ok(results) => {
                    if auto_deliver {
                        for result in &results {
                            self.delivery.deliver(result.image_arc(), result.file_name());
                        }
                    }
                    let mut results = results.into_iter();
                    let Some(representative) = results.next() else {
                        send(
                            &events,
                            BatchEvent::ItemFailed {
                                index,
                                error: "no frames were extracted".to_string(),
                            },
                        );
                        continue;
                    };
                    for extra in results {
                        extra.release(self.extractor.registry());
                    }
                    send(
                        &events,
                        BatchEvent::ItemCompleted {
                            index,
                            result: representative,
                        },
                    );
                }
                Err(error) => {
                    log::warn!("Batch item {file} failed: {error}");
                    let cancelled = matches!(error, EndframeError::Cancelled);
                    send(
                        &events,
                        BatchEvent::ItemFailed {
                            index,
                            error: error.to_string(),
                        },
                    );
                    if cancelled {
                        break;
                    }
                }
            }
        }

        send(&events, BatchEvent::Finished);
    }
}

fn send(events: &UnboundedSender<BatchEvent>, event: BatchEvent) {
    if events.send(event).is_err() {
        log::trace!("Batch event dropped: no board is listening");
    }
}
