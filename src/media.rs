//! The decodable media resource seam.
//!
//! Decoding is delegated to the host. A [`MediaResource`] behaves like a
//! platform video element: it is configured, told to load a source through a
//! [`ResourceHandle`], and then reports progress asynchronously as
//! [`MediaEvent`]s on a subscription channel. Requests (`load`, `seek`) never
//! block; their outcome arrives later as an event, or not at all on hosts
//! with unreliable pipelines.
//!
//! [`FfmpegBackend`](crate::FfmpegBackend) is the bundled implementation.
//! Tests and embedders can supply their own through [`MediaBackend`].

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{handle::ResourceHandle, surface::Surface};

/// Identifies one seek request so its completion can be matched.
pub type SeekTicket = u64;

/// Notifications a media resource emits while loading and seeking.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Container metadata (dimensions, duration if known) is available.
    LoadedMetadata,
    /// The reported duration changed.
    DurationChanged,
    /// The first frame has been decoded.
    LoadedData,
    /// The seek identified by `ticket` completed.
    Seeked {
        /// Ticket returned by [`MediaResource::seek`].
        ticket: SeekTicket,
    },
    /// Loading or decoding failed. No further events follow.
    Error(String),
}

impl MediaEvent {
    /// Whether this event can signal that duration information is available.
    pub fn is_readiness_signal(&self) -> bool {
        matches!(
            self,
            MediaEvent::LoadedMetadata | MediaEvent::DurationChanged | MediaEvent::LoadedData
        )
    }
}

/// How a resource should behave while loading.
///
/// The defaults (muted, no autoplay, inline, preload) are what restrictive
/// mobile hosts require before they will decode without a user gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Decode without audio output.
    pub muted: bool,
    /// Start playback as soon as possible.
    pub autoplay: bool,
    /// Render inline rather than taking over the screen.
    pub inline: bool,
    /// Fetch and decode eagerly.
    pub preload: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            muted: true,
            autoplay: false,
            inline: true,
            preload: true,
        }
    }
}

/// A single decodable media resource.
///
/// Durations and times are in seconds. [`duration`](MediaResource::duration)
/// may be `NaN` before metadata arrives and `f64::INFINITY` for streams whose
/// length the host could not determine up front.
pub trait MediaResource: Send {
    /// Apply playback settings. Called before [`load`](MediaResource::load).
    fn configure(&mut self, options: PlaybackOptions);

    /// Attach a listener. Events emitted before subscribing are dropped.
    fn subscribe(&mut self) -> UnboundedReceiver<MediaEvent>;

    /// Detach every listener.
    fn unsubscribe(&mut self);

    /// Begin loading the source behind `source`.
    fn load(&mut self, source: &ResourceHandle);

    /// Current duration estimate.
    fn duration(&self) -> f64;

    /// Presentation time of the frame currently displayed.
    fn current_time(&self) -> f64;

    /// Native pixel dimensions of the decoded video, `(0, 0)` if unknown.
    fn video_dimensions(&self) -> (u32, u32);

    /// Request a seek. Completion is reported as [`MediaEvent::Seeked`] with
    /// the returned ticket, if the host reports it at all.
    fn seek(&mut self, seconds: f64) -> SeekTicket;

    /// Rasterise the currently displayed frame into `surface`.
    fn draw_frame(&self, surface: &mut Surface) -> Result<(), String>;

    /// Stop all work and drop decoded data.
    fn release(&mut self);
}

/// Creates media resources. One resource serves exactly one extraction.
pub trait MediaBackend: Send + Sync {
    /// Allocate a fresh, unloaded resource.
    fn create_resource(&self) -> Box<dyn MediaResource>;
}
