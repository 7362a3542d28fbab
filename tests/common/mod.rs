//! Scripted stand-ins for the host decoder and delivery targets.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use endframe::{
    DeliveryError, DownloadSink, ExtractOptions, FrameExtractor, HandleRegistry, HandleTarget,
    MediaBackend, MediaEvent, MediaResource, PlaybackOptions, ResourceHandle, SeekTicket, Surface,
};
use image::{Rgba, RgbaImage};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// How a fake resource behaves for one file.
#[derive(Debug, Clone)]
pub struct Script {
    /// Duration reported once metadata loads. May be `INFINITY` or `NAN`.
    pub duration: f64,
    /// Duration revealed by an out-of-range seek when `duration` is infinite.
    pub resolved_duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    /// Never report seek completion.
    pub silent_seeks: bool,
    /// Never report readiness.
    pub silent_load: bool,
    /// Report this load error instead of metadata.
    pub load_error: Option<String>,
    /// Fail every draw.
    pub draw_error: Option<String>,
    /// Snap seeks down to this frame grid.
    pub frame_interval: Option<f64>,
    /// Report this decode error instead of completing the n-th seek (1-based).
    pub seek_error: Option<(usize, String)>,
    /// Drop the event channel instead of completing the n-th seek (1-based).
    pub close_on_seek: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            duration: 10.0,
            resolved_duration: None,
            width: 64,
            height: 36,
            silent_seeks: false,
            silent_load: false,
            load_error: None,
            draw_error: None,
            frame_interval: None,
            seek_error: None,
            close_on_seek: None,
        }
    }
}

impl Script {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn failing_load(reason: &str) -> Self {
        Self {
            load_error: Some(reason.to_string()),
            ..Self::default()
        }
    }
}

/// Counters shared by every resource a backend creates.
#[derive(Debug, Default)]
pub struct Stats {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub unsubscribed: AtomicUsize,
    pub seeks: Mutex<Vec<f64>>,
    pub loaded: Mutex<Vec<String>>,
    pub playback: Mutex<Option<PlaybackOptions>>,
}

impl Stats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

/// A [`MediaBackend`] whose resources follow a [`Script`] chosen by file name.
pub struct FakeBackend {
    registry: Arc<HandleRegistry>,
    default_script: Script,
    scripts: HashMap<String, Script>,
    pub stats: Arc<Stats>,
}

impl FakeBackend {
    pub fn new(registry: Arc<HandleRegistry>) -> Self {
        Self {
            registry,
            default_script: Script::default(),
            scripts: HashMap::new(),
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with_default(mut self, script: Script) -> Self {
        self.default_script = script;
        self
    }

    pub fn with_script(mut self, file_name: &str, script: Script) -> Self {
        self.scripts.insert(file_name.to_string(), script);
        self
    }
}

impl MediaBackend for FakeBackend {
    fn create_resource(&self) -> Box<dyn MediaResource> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeResource {
            registry: Arc::clone(&self.registry),
            default_script: self.default_script.clone(),
            scripts: self.scripts.clone(),
            script: self.default_script.clone(),
            stats: Arc::clone(&self.stats),
            sender: None,
            duration: f64::NAN,
            current_time: 0.0,
            last_ticket: 0,
            seek_count: 0,
        })
    }
}

struct FakeResource {
    registry: Arc<HandleRegistry>,
    default_script: Script,
    scripts: HashMap<String, Script>,
    script: Script,
    stats: Arc<Stats>,
    sender: Option<UnboundedSender<MediaEvent>>,
    duration: f64,
    current_time: f64,
    last_ticket: SeekTicket,
    seek_count: usize,
}

impl FakeResource {
    fn emit(&self, event: MediaEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

impl MediaResource for FakeResource {
    fn configure(&mut self, options: PlaybackOptions) {
        *self.stats.playback.lock().unwrap() = Some(options);
    }

    fn subscribe(&mut self) -> UnboundedReceiver<MediaEvent> {
        let (sender, receiver) = unbounded_channel();
        self.sender = Some(sender);
        receiver
    }

    fn unsubscribe(&mut self) {
        self.stats.unsubscribed.fetch_add(1, Ordering::SeqCst);
        self.sender = None;
    }

    fn load(&mut self, source: &ResourceHandle) {
        let Some(HandleTarget::File(path)) = self.registry.resolve(source) else {
            self.emit(MediaEvent::Error("source handle does not resolve".to_string()));
            return;
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.stats.loaded.lock().unwrap().push(name.clone());
        self.script = self
            .scripts
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());

        if let Some(reason) = self.script.load_error.clone() {
            self.emit(MediaEvent::Error(reason));
            return;
        }
        if self.script.silent_load {
            return;
        }
        self.duration = self.script.duration;
        self.emit(MediaEvent::LoadedMetadata);
        self.emit(MediaEvent::DurationChanged);
        self.emit(MediaEvent::LoadedData);
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn video_dimensions(&self) -> (u32, u32) {
        (self.script.width, self.script.height)
    }

    fn seek(&mut self, seconds: f64) -> SeekTicket {
        self.stats.seeks.lock().unwrap().push(seconds);
        self.last_ticket += 1;
        self.seek_count += 1;

        if let Some((at, reason)) = &self.script.seek_error {
            if *at == self.seek_count {
                self.emit(MediaEvent::Error(reason.clone()));
                return self.last_ticket;
            }
        }
        if self.script.close_on_seek == Some(self.seek_count) {
            self.sender = None;
            return self.last_ticket;
        }

        if self.duration == f64::INFINITY {
            if let Some(resolved) = self.script.resolved_duration {
                self.duration = resolved;
                self.current_time = resolved;
                self.emit(MediaEvent::DurationChanged);
            }
        } else {
            let mut position = seconds.clamp(0.0, self.duration.max(0.0));
            if let Some(interval) = self.script.frame_interval {
                position = (position / interval).floor() * interval;
            }
            self.current_time = position;
        }

        if !self.script.silent_seeks {
            self.emit(MediaEvent::Seeked {
                ticket: self.last_ticket,
            });
        }
        self.last_ticket
    }

    fn draw_frame(&self, surface: &mut Surface) -> Result<(), String> {
        if let Some(reason) = &self.script.draw_error {
            return Err(reason.clone());
        }
        let shade = (self.current_time * 10.0) as u8;
        let frame = RgbaImage::from_pixel(
            self.script.width,
            self.script.height,
            Rgba([shade, 0, 0, 255]),
        );
        surface.draw(&frame);
        Ok(())
    }

    fn release(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Build an extractor over a fake backend sharing `registry`.
pub fn extractor(
    backend: FakeBackend,
    registry: &Arc<HandleRegistry>,
    options: ExtractOptions,
) -> (FrameExtractor, Arc<Stats>) {
    let stats = Arc::clone(&backend.stats);
    let extractor = FrameExtractor::new(Arc::new(backend), Arc::clone(registry), options);
    (extractor, stats)
}

/// A [`DownloadSink`] that records what it was asked to store.
#[derive(Default)]
pub struct RecordingSink {
    registry: Option<Arc<HandleRegistry>>,
    pub failure: Option<String>,
    pub downloads: Mutex<Vec<(String, usize)>>,
}

impl RecordingSink {
    pub fn new(registry: Arc<HandleRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    pub fn failing(registry: Arc<HandleRegistry>, reason: &str) -> Self {
        Self {
            registry: Some(registry),
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl DownloadSink for RecordingSink {
    fn download(&self, handle: &ResourceHandle, file_name: &str) -> Result<(), DeliveryError> {
        if let Some(reason) = &self.failure {
            return Err(DeliveryError::IoError(std::io::Error::other(reason.clone())));
        }
        let size = match self.registry.as_ref().and_then(|registry| registry.resolve(handle)) {
            Some(HandleTarget::Bytes(data)) => data.len(),
            _ => return Err(DeliveryError::HandleRevoked(handle.to_string())),
        };
        self.downloads
            .lock()
            .unwrap()
            .push((file_name.to_string(), size));
        Ok(())
    }
}
