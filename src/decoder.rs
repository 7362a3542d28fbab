//! FFmpeg-backed media resources.
//!
//! Each [`FfmpegResource`] owns a blocking worker task that opens the source,
//! decodes on request, and reports back through [`MediaEvent`]s, so the async
//! extractor never blocks on demuxing or decoding. A seek decodes forward from
//! the preceding keyframe and keeps the last frame presented at or before the
//! target, the way a video element settles on the frame on screen at that
//! time.
//!
//! Containers that do not declare a duration report `f64::INFINITY` until a
//! seek past the end has scanned the stream, after which the duration is the
//! end of the last decoded frame and [`MediaEvent::DurationChanged`] fires.
//!
//! Times are relative to the start of the video stream. Transport streams
//! commonly start well after zero, so the stream's start time is added to
//! every seek and subtracted from every decoded timestamp.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbaImage;
use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};

use crate::{
    error::EndframeError,
    handle::{HandleRegistry, HandleTarget, ResourceHandle},
    media::{MediaBackend, MediaEvent, MediaResource, PlaybackOptions, SeekTicket},
    surface::Surface,
    utilities::{
        frame_interval, frame_to_rgba_buffer, pts_to_seconds, seconds_to_stream_timestamp,
        stream_start_seconds,
    },
};

/// Microseconds, the unit of container-level seeks and durations.
const CONTAINER_TIME_BASE: (i32, i32) = (1, 1_000_000);

/// Creates [`FfmpegResource`]s that resolve their sources through a shared
/// [`HandleRegistry`].
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    registry: Arc<HandleRegistry>,
}

impl FfmpegBackend {
    /// Create a backend resolving source handles through `registry`.
    pub fn new(registry: Arc<HandleRegistry>) -> Self {
        Self { registry }
    }

    /// Same as [`new`](FfmpegBackend::new), wrapped for sharing.
    pub fn shared(registry: Arc<HandleRegistry>) -> Arc<Self> {
        Arc::new(Self::new(registry))
    }
}

impl MediaBackend for FfmpegBackend {
    fn create_resource(&self) -> Box<dyn MediaResource> {
        Box::new(FfmpegResource::new(Arc::clone(&self.registry)))
    }
}

/// What the worker has learned about the source so far.
#[derive(Debug)]
struct PlaybackState {
    duration: f64,
    current_time: f64,
    width: u32,
    height: u32,
    frame: Option<RgbaImage>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            duration: f64::NAN,
            current_time: 0.0,
            width: 0,
            height: 0,
            frame: None,
        }
    }
}

enum Command {
    Seek { target: f64, ticket: SeekTicket },
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A media resource decoded by FFmpeg on a blocking worker task.
pub struct FfmpegResource {
    registry: Arc<HandleRegistry>,
    options: PlaybackOptions,
    state: Shared<PlaybackState>,
    listener: Shared<Option<UnboundedSender<MediaEvent>>>,
    commands: Option<UnboundedSender<Command>>,
    last_ticket: SeekTicket,
}

impl FfmpegResource {
    fn new(registry: Arc<HandleRegistry>) -> Self {
        Self {
            registry,
            options: PlaybackOptions::default(),
            state: Arc::new(Mutex::new(PlaybackState::default())),
            listener: Arc::new(Mutex::new(None)),
            commands: None,
            last_ticket: 0,
        }
    }

    fn fail(&self, reason: String) {
        log::warn!("{reason}");
        emit(&self.listener, MediaEvent::Error(reason));
    }
}

impl MediaResource for FfmpegResource {
    fn configure(&mut self, options: PlaybackOptions) {
        self.options = options;
    }

    fn subscribe(&mut self) -> UnboundedReceiver<MediaEvent> {
        let (sender, receiver) = unbounded_channel();
        *lock(&self.listener) = Some(sender);
        receiver
    }

    fn unsubscribe(&mut self) {
        lock(&self.listener).take();
    }

    fn load(&mut self, source: &ResourceHandle) {
        let path = match self.registry.resolve(source) {
            Some(HandleTarget::File(path)) => path,
            Some(HandleTarget::Bytes(_)) => {
                self.fail(format!("{source} does not refer to a file"));
                return;
            }
            None => {
                self.fail(format!("{source} has been revoked"));
                return;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            self.fail("decoding requires a running tokio runtime".to_string());
            return;
        };

        let (sender, receiver) = unbounded_channel();
        let worker = Worker {
            path,
            options: self.options,
            state: Arc::clone(&self.state),
            listener: Arc::clone(&self.listener),
        };
        let decoding = runtime.spawn_blocking(move || worker.run(receiver));

        let listener = Arc::clone(&self.listener);
        runtime.spawn(async move {
            if let Err(error) = decoding.await {
                if error.is_panic() {
                    log::error!("Decoder worker panicked: {error}");
                    emit(&listener, MediaEvent::Error("decoder worker panicked".to_string()));
                }
            }
        });
        self.commands = Some(sender);
    }

    fn duration(&self) -> f64 {
        lock(&self.state).duration
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).current_time
    }

    fn video_dimensions(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }

    fn seek(&mut self, seconds: f64) -> SeekTicket {
        self.last_ticket += 1;
        let ticket = self.last_ticket;
        if let Some(commands) = &self.commands {
            // A closed channel means the worker already stopped; the seek
            // then simply never completes.
            let _ = commands.send(Command::Seek {
                target: seconds,
                ticket,
            });
        }
        ticket
    }

    fn draw_frame(&self, surface: &mut Surface) -> Result<(), String> {
        let state = lock(&self.state);
        let frame = state
            .frame
            .as_ref()
            .ok_or_else(|| "no frame has been decoded yet".to_string())?;
        surface.draw(frame);
        Ok(())
    }

    fn release(&mut self) {
        // Dropping the sender stops the worker after its current command.
        self.commands.take();
        lock(&self.state).frame.take();
    }
}

impl Drop for FfmpegResource {
    fn drop(&mut self) {
        self.release();
    }
}

fn emit(listener: &Mutex<Option<UnboundedSender<MediaEvent>>>, event: MediaEvent) {
    if let Some(sender) = lock(listener).as_ref() {
        let _ = sender.send(event);
    }
}

/// Everything the worker task needs, moved onto it at load time.
struct Worker {
    path: PathBuf,
    options: PlaybackOptions,
    state: Shared<PlaybackState>,
    listener: Shared<Option<UnboundedSender<MediaEvent>>>,
}

impl Worker {
    fn run(self, mut commands: UnboundedReceiver<Command>) {
        let mut session = match DecodeSession::open(&self.path) {
            Ok(session) => session,
            Err(error) => {
                self.report(error);
                return;
            }
        };

        {
            let mut state = lock(&self.state);
            state.width = session.width;
            state.height = session.height;
            state.duration = session.duration;
        }
        log::debug!(
            "Opened {} ({}x{}, duration {:.3}s, muted={}, preload={})",
            self.path.display(),
            session.width,
            session.height,
            session.duration,
            self.options.muted,
            self.options.preload,
        );
        self.emit(MediaEvent::LoadedMetadata);
        self.emit(MediaEvent::DurationChanged);

        if self.options.preload {
            match session.settle(0.0) {
                Ok(Some(settled)) => {
                    self.store(settled);
                    self.emit(MediaEvent::LoadedData);
                }
                Ok(None) => {
                    self.report(EndframeError::FfmpegError(
                        "no decodable video frames".to_string(),
                    ));
                    return;
                }
                Err(error) => {
                    self.report(error);
                    return;
                }
            }
        }

        while let Some(Command::Seek { target, ticket }) = commands.blocking_recv() {
            let previous_duration = session.duration;
            match session.settle(target) {
                Ok(settled) => {
                    if let Some(settled) = settled {
                        self.store(settled);
                    }
                    if session.duration != previous_duration {
                        lock(&self.state).duration = session.duration;
                        self.emit(MediaEvent::DurationChanged);
                    }
                    self.emit(MediaEvent::Seeked { ticket });
                }
                Err(error) => {
                    self.report(error);
                    return;
                }
            }
        }
        log::trace!("Decoder for {} stopped", self.path.display());
    }

    fn store(&self, settled: SettledFrame) {
        let mut state = lock(&self.state);
        state.current_time = settled.time;
        state.frame = Some(settled.image);
    }

    fn emit(&self, event: MediaEvent) {
        emit(&self.listener, event);
    }

    fn report(&self, error: EndframeError) {
        log::warn!("Decoding {} failed: {error}", self.path.display());
        self.emit(MediaEvent::Error(error.to_string()));
    }
}

/// A decoded frame converted to RGBA, with its presentation time.
struct SettledFrame {
    time: f64,
    image: RgbaImage,
}

/// Demuxer, decoder, and scaler for the best video stream of one input.
struct DecodeSession {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    /// Presentation time of the first video frame, in seconds.
    start_offset: f64,
    frame_interval: Option<f64>,
    width: u32,
    height: u32,
    duration: f64,
}

impl DecodeSession {
    fn open(path: &Path) -> Result<Self, EndframeError> {
        ffmpeg_next::init()?;
        let input = ffmpeg_next::format::input(&path)?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| EndframeError::FfmpegError("no video stream".to_string()))?;

        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_offset = stream_start_seconds(stream.start_time(), time_base);
        let frame_interval = frame_interval(stream.avg_frame_rate());
        let stream_duration = stream.duration();
        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGBA,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        let container_duration = input.duration();
        let duration = if container_duration > 0 {
            pts_to_seconds(container_duration, container_time_base())
        } else if stream_duration > 0 {
            pts_to_seconds(stream_duration, time_base)
        } else {
            f64::INFINITY
        };

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_offset,
            frame_interval,
            width,
            height,
            duration,
        })
    }

    /// Decode the frame on display at `target`.
    ///
    /// Returns `None` only when the stream yields no frames at all from the
    /// nearest preceding keyframe onwards.
    fn settle(&mut self, target: f64) -> Result<Option<SettledFrame>, EndframeError> {
        let scan_to_end = !self.duration.is_finite();
        let start = if scan_to_end {
            0.0
        } else {
            target.clamp(0.0, self.duration)
        };
        let position =
            seconds_to_stream_timestamp(start + self.start_offset, container_time_base());
        self.input.seek(position, ..position)?;
        self.decoder.flush();

        let mut decoded = VideoFrame::empty();
        let mut candidate = VideoFrame::empty();
        let mut candidate_time: Option<f64> = None;
        let mut passed_target = false;

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let time = frame_time(&decoded, self.time_base) - self.start_offset;
                if candidate_time.is_some() && time > target {
                    passed_target = true;
                    break;
                }
                std::mem::swap(&mut candidate, &mut decoded);
                candidate_time = Some(time);
            }
            if passed_target {
                break;
            }
        }

        if !passed_target {
            self.decoder.send_eof()?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let time = frame_time(&decoded, self.time_base) - self.start_offset;
                if candidate_time.is_some() && time > target {
                    passed_target = true;
                    break;
                }
                std::mem::swap(&mut candidate, &mut decoded);
                candidate_time = Some(time);
            }
        }

        let Some(time) = candidate_time else {
            return Ok(None);
        };

        if scan_to_end && !passed_target {
            let end = time + self.frame_interval.unwrap_or(0.0);
            if end > 0.0 {
                log::debug!("Resolved unbounded duration to {end:.3}s");
                self.duration = end;
            }
        }

        let mut rgba = VideoFrame::empty();
        self.scaler.run(&candidate, &mut rgba)?;
        let buffer = frame_to_rgba_buffer(&rgba, self.width, self.height);
        let image = RgbaImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            EndframeError::FfmpegError("decoded frame has an unexpected size".to_string())
        })?;

        Ok(Some(SettledFrame { time, image }))
    }
}

fn container_time_base() -> Rational {
    Rational::new(CONTAINER_TIME_BASE.0, CONTAINER_TIME_BASE.1)
}

fn frame_time(frame: &VideoFrame, time_base: Rational) -> f64 {
    frame
        .timestamp()
        .or_else(|| frame.pts())
        .map_or(0.0, |pts| pts_to_seconds(pts, time_base))
}
