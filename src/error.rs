//! Error types for the `endframe` crate.
//!
//! [`EndframeError`] is returned by every fallible extraction and batch
//! operation. [`DeliveryError`] is internal to artifact delivery: delivery is
//! best-effort, so these errors are logged and trigger a fallback instead of
//! reaching the caller.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// Note appended to every per-file failure so the message can be shown to a
/// user as-is.
const UNSUPPORTED_HINT: &str = "The format might not be supported by this platform's decoder.";

/// The unified error type for extraction, batch, and session operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EndframeError {
    /// The acceptor rejected the input before any decoding started.
    #[error("Not a recognised video file: {path}")]
    UnsupportedFile {
        /// The rejected input.
        path: PathBuf,
    },

    /// None of the files handed to a session were acceptable videos.
    #[error("Please select a valid video file")]
    NoAcceptableFiles,

    /// A frame count of zero was requested.
    #[error("Frame count must be at least 1 (got {0})")]
    InvalidFrameCount(usize),

    /// The media resource reported a load or decode failure, or never became
    /// ready within its time budget.
    #[error("Error loading video file {file}: {reason}. {UNSUPPORTED_HINT}")]
    DecodeError {
        /// Display name of the source file.
        file: String,
        /// What went wrong.
        reason: String,
    },

    /// Rasterising or encoding a frame failed after a seek.
    #[error("Failed to capture a frame from {file}: {reason}. {UNSUPPORTED_HINT}")]
    CaptureError {
        /// Display name of the source file.
        file: String,
        /// What went wrong.
        reason: String,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for EndframeError {
    fn from(error: FfmpegError) -> Self {
        EndframeError::FfmpegError(error.to_string())
    }
}

impl EndframeError {
    pub(crate) fn decode(file: &str, reason: impl Into<String>) -> Self {
        EndframeError::DecodeError {
            file: file.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn capture(file: &str, reason: impl Into<String>) -> Self {
        EndframeError::CaptureError {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a single delivery strategy could not hand an artifact to the user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// The host's share capability rejected or aborted the share.
    #[error("Share failed: {0}")]
    ShareFailed(String),

    /// Neither a new browsing context nor in-place navigation was possible.
    #[error("Could not open the artifact: {0}")]
    NavigationBlocked(String),

    /// The handle given to the sink no longer resolves to any data.
    #[error("Resource handle {0} has been revoked")]
    HandleRevoked(String),

    /// The artifact would overwrite an existing file.
    #[error("Output file already exists: {0} (use --overwrite)")]
    AlreadyExists(PathBuf),

    /// Writing the artifact failed.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}
