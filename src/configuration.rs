//! Extraction configuration.
//!
//! [`ExtractOptions`] is a builder that carries timing policy, playback
//! settings, and an optional cancellation token into the extractor and the
//! delivery layer without widening every signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use endframe::{CancellationToken, ExtractOptions};
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_seek_timeout(Duration::from_millis(500))
//!     .with_frame_stride(Duration::from_millis(40))
//!     .with_cancellation(token.clone());
//! assert_eq!(options.seek_timeout(), Duration::from_millis(500));
//! ```

use std::time::Duration;

use crate::{media::PlaybackOptions, progress::CancellationToken};

const DEFAULT_END_EPSILON: Duration = Duration::from_millis(1);
const DEFAULT_FRAME_STRIDE: Duration = Duration::from_millis(100);
const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_REVOKE_DELAY: Duration = Duration::from_millis(150);

/// Settings for extraction and delivery.
///
/// All fields have defaults; a default-constructed value extracts frames
/// 1 ms before the end and 100 ms apart, waits up to 2 s per seek and
/// 15 s for the resource to become ready.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub(crate) end_epsilon: Duration,
    pub(crate) frame_stride: Duration,
    pub(crate) seek_timeout: Duration,
    pub(crate) ready_timeout: Duration,
    pub(crate) revoke_delay: Duration,
    pub(crate) playback: PlaybackOptions,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            end_epsilon: DEFAULT_END_EPSILON,
            frame_stride: DEFAULT_FRAME_STRIDE,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            revoke_delay: DEFAULT_REVOKE_DELAY,
            playback: PlaybackOptions::default(),
            cancellation: None,
        }
    }

    /// Distance kept from the reported end of stream, which some decoders
    /// refuse to rasterise.
    #[must_use]
    pub fn with_end_epsilon(mut self, epsilon: Duration) -> Self {
        self.end_epsilon = epsilon;
        self
    }

    /// Spacing between successive end-of-video frames.
    #[must_use]
    pub fn with_frame_stride(mut self, stride: Duration) -> Self {
        self.frame_stride = stride;
        self
    }

    /// How long to wait for a seek-completion event before capturing anyway.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// How long to wait for a usable duration before failing the file.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Delay before a delivery strategy revokes the handle it allocated.
    #[must_use]
    pub fn with_revoke_delay(mut self, delay: Duration) -> Self {
        self.revoke_delay = delay;
        self
    }

    /// Playback settings applied to every media resource.
    #[must_use]
    pub fn with_playback(mut self, playback: PlaybackOptions) -> Self {
        self.playback = playback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, extraction stops at the next state
    /// boundary or wait and returns
    /// [`EndframeError::Cancelled`](crate::EndframeError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Configured end-of-stream epsilon.
    pub fn end_epsilon(&self) -> Duration {
        self.end_epsilon
    }

    /// Configured frame stride.
    pub fn frame_stride(&self) -> Duration {
        self.frame_stride
    }

    /// Configured seek timeout.
    pub fn seek_timeout(&self) -> Duration {
        self.seek_timeout
    }

    /// Configured ready timeout.
    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    /// Configured revoke delay.
    pub fn revoke_delay(&self) -> Duration {
        self.revoke_delay
    }

    /// Configured playback settings.
    pub fn playback(&self) -> PlaybackOptions {
        self.playback
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Resolves when cancellation is requested; never resolves without a token.
    pub(crate) async fn cancelled(&self) {
        match &self.cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
