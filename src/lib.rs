//! # endframe
//!
//! Grab the final frames of video files as lossless PNG stills, for one file
//! or a whole batch.
//!
//! Media pipelines are unreliable at the end of a stream: durations come back
//! unknown or infinite, seeks never report completion, and some containers
//! only decode on certain hosts. `endframe` drives a decodable media resource
//! through a bounded state machine so every extraction either produces all of
//! its frames or fails with a message naming the file, and never hangs.
//! Decoding is powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate, behind a
//! [`MediaBackend`] seam that other hosts can implement.
//!
//! ## Quick Start
//!
//! ### Extract the last frames of one video
//!
//! ```no_run
//! use endframe::{ExtractOptions, FfmpegBackend, FrameExtractor, HandleRegistry, VideoFile};
//!
//! # async fn example() -> Result<(), endframe::EndframeError> {
//! let registry = HandleRegistry::new();
//! let extractor = FrameExtractor::new(
//!     FfmpegBackend::shared(registry.clone()),
//!     registry,
//!     ExtractOptions::new(),
//! );
//!
//! // clip_end_3.png, clip_end_2.png, clip_end_1.png
//! for frame in extractor.extract(&VideoFile::new("clip.mp4"), 3).await? {
//!     std::fs::write(frame.file_name(), frame.image_data())?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Process a batch and save every frame
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use endframe::{
//!     Delivery, DirectorySink, DownloadStrategy, ExtractOptions, FfmpegBackend,
//!     FrameExtractor, HandleRegistry, Session, VideoFile,
//! };
//!
//! # async fn example() -> Result<(), endframe::EndframeError> {
//! let registry = HandleRegistry::new();
//! let sink = DirectorySink::new("frames", registry.clone());
//! let delivery = Delivery::new().with_strategy(DownloadStrategy::new(
//!     Arc::new(sink),
//!     registry.clone(),
//!     Duration::from_millis(150),
//! ));
//! let extractor = FrameExtractor::new(
//!     FfmpegBackend::shared(registry.clone()),
//!     registry,
//!     ExtractOptions::new(),
//! );
//! let session = Session::new(extractor, Arc::new(delivery));
//!
//! let files = vec![VideoFile::new("a.mp4"), VideoFile::new("b.mkv")];
//! session.process(files, 1, true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lenient input filtering**: declared `video/*` type or a known
//!   container/codec extension
//! - **Bounded waits**: readiness and seek timeouts, with recovery for
//!   streams that report an infinite duration
//! - **Deterministic naming**: `<base>_end.png`, or `<base>_end_<n>.png`
//!   for several frames
//! - **Sequential batches**: per-item status, progress, and isolation of
//!   failures
//! - **Ranked delivery**: share, open, or download, with fallbacks
//! - **Leak accounting**: every temporary handle goes through a
//!   [`HandleRegistry`]
//! - **Cooperative cancellation** via [`CancellationToken`]
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod acceptor;
pub mod artifact;
pub mod batch;
pub mod configuration;
pub mod decoder;
pub mod delivery;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod handle;
pub mod media;
pub mod platform;
pub mod progress;
pub mod session;
pub mod surface;
mod utilities;

pub use acceptor::{VIDEO_EXTENSIONS, VideoFile, is_acceptable, partition_acceptable};
pub use artifact::{ExtractionResult, artifact_file_name, target_timestamp};
pub use batch::{BatchBoard, BatchEvent, BatchItem, BatchItemStatus, BatchRunner};
pub use configuration::ExtractOptions;
pub use decoder::{FfmpegBackend, FfmpegResource};
pub use delivery::{
    Artifact, BrowsingContext, Delivery, DeliveryStrategy, DirectorySink, DownloadSink,
    DownloadStrategy, NewContextStrategy, ShareStrategy, ShareTarget,
};
pub use error::{DeliveryError, EndframeError};
pub use extractor::FrameExtractor;
pub use ffmpeg::{DecoderLogLevel, get_decoder_log_level, set_decoder_log_level};
pub use handle::{HandleRegistry, HandleTarget, ResourceHandle};
pub use media::{MediaBackend, MediaEvent, MediaResource, PlaybackOptions, SeekTicket};
pub use platform::PlatformProfile;
pub use progress::{BatchProgress, CancellationToken};
pub use session::{Session, SessionOutcome};
pub use surface::{ARTIFACT_EXTENSION, ARTIFACT_MEDIA_TYPE, Surface};
