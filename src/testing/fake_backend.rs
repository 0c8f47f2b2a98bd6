//! Scriptable in-memory media backend
//!
//! `FakeBackend` is a cheap clone around shared state, so a test can hand one
//! copy to the coordinator and keep another to script results, fire events
//! and inspect what is still alive.

use crate::errors::MediaError;
use crate::platform::{
    DocumentSource, Listener, ListenerSet, MediaBackend, MediaEvent, MediaStream, Subscription,
    VideoSink,
};
use crate::testing::synthetic_data::synthetic_frame;
use crate::types::{Constraints, DeviceDescriptor};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted result of one `request_stream` call.
#[derive(Debug, Clone)]
enum StreamScript {
    Open { video_tracks: usize },
    Fail(MediaError),
}

struct FakeShared {
    supported: AtomicBool,
    permission: Mutex<Result<(), MediaError>>,
    devices: Mutex<Result<Vec<DeviceDescriptor>, MediaError>>,
    stream_scripts: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<Constraints>>,
    gate: Mutex<Option<Arc<Notify>>>,
    play_result: Mutex<Result<(), MediaError>>,
    frame_size: Mutex<(u32, u32)>,
    frames_available: AtomicBool,
    frame_counter: AtomicU64,
    permission_requests: AtomicUsize,
    streams_opened: AtomicUsize,
    live_streams: AtomicUsize,
    max_live_streams: AtomicUsize,
    visibility: ListenerSet,
    device_change: ListenerSet,
    sink_events: ListenerSet,
    current_track: Mutex<Option<ListenerSet>>,
}

#[derive(Clone)]
pub struct FakeBackend {
    shared: Arc<FakeShared>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// Supported, permission granted, no devices, every stream request succeeds.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FakeShared {
                supported: AtomicBool::new(true),
                permission: Mutex::new(Ok(())),
                devices: Mutex::new(Ok(Vec::new())),
                stream_scripts: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
                play_result: Mutex::new(Ok(())),
                frame_size: Mutex::new((1280, 720)),
                frames_available: AtomicBool::new(true),
                frame_counter: AtomicU64::new(0),
                permission_requests: AtomicUsize::new(0),
                streams_opened: AtomicUsize::new(0),
                live_streams: AtomicUsize::new(0),
                max_live_streams: AtomicUsize::new(0),
                visibility: ListenerSet::new(),
                device_change: ListenerSet::new(),
                sink_events: ListenerSet::new(),
                current_track: Mutex::new(None),
            }),
        }
    }

    pub fn with_devices(self, devices: Vec<DeviceDescriptor>) -> Self {
        self.set_devices(devices);
        self
    }

    pub fn set_supported(&self, supported: bool) {
        self.shared.supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_permission(&self, result: Result<(), MediaError>) {
        *lock(&self.shared.permission) = result;
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *lock(&self.shared.devices) = Ok(devices);
    }

    pub fn fail_enumeration(&self, error: MediaError) {
        *lock(&self.shared.devices) = Err(error);
    }

    /// Fail the next unscripted `request_stream` call with `error`.
    pub fn queue_stream_error(&self, error: MediaError) {
        lock(&self.shared.stream_scripts).push_back(StreamScript::Fail(error));
    }

    /// Make the next `request_stream` call return a stream without a video track.
    pub fn queue_stream_without_video(&self) {
        lock(&self.shared.stream_scripts).push_back(StreamScript::Open { video_tracks: 0 });
    }

    pub fn set_play_result(&self, result: Result<(), MediaError>) {
        *lock(&self.shared.play_result) = result;
    }

    /// Native size the sink reports; `(0, 0)` mimics metadata not loaded yet.
    pub fn set_frame_size(&self, width: u32, height: u32) {
        *lock(&self.shared.frame_size) = (width, height);
    }

    pub fn set_frames_available(&self, available: bool) {
        self.shared.frames_available.store(available, Ordering::SeqCst);
    }

    /// Park every `request_stream` call until [`FakeBackend::release_requests`].
    pub fn hold_requests(&self) {
        *lock(&self.shared.gate) = Some(Arc::new(Notify::new()));
    }

    pub fn release_requests(&self) {
        if let Some(gate) = lock(&self.shared.gate).take() {
            gate.notify_waiters();
        }
    }

    pub fn emit_sink(&self, event: MediaEvent) {
        self.shared.sink_events.emit(event);
    }

    pub fn emit_track(&self, event: MediaEvent) {
        let track = lock(&self.shared.current_track).clone();
        if let Some(track) = track {
            track.emit(event);
        }
    }

    pub fn emit_visibility(&self, visible: bool) {
        let event = if visible {
            MediaEvent::VisibilityVisible
        } else {
            MediaEvent::VisibilityHidden
        };
        self.shared.visibility.emit(event);
    }

    pub fn emit_device_change(&self) {
        self.shared.device_change.emit(MediaEvent::DeviceChange);
    }

    /// Sink listeners currently attached, for replaying late callbacks.
    pub fn sink_listeners(&self) -> Vec<Listener> {
        self.shared.sink_events.snapshot()
    }

    /// Every listener still attached anywhere in the backend.
    pub fn listener_count(&self) -> usize {
        let track = lock(&self.shared.current_track)
            .as_ref()
            .map_or(0, ListenerSet::len);
        self.shared.visibility.len()
            + self.shared.device_change.len()
            + self.shared.sink_events.len()
            + track
    }

    pub fn requests(&self) -> Vec<Constraints> {
        lock(&self.shared.requests).clone()
    }

    pub fn permission_requests(&self) -> usize {
        self.shared.permission_requests.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.shared.streams_opened.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.shared.live_streams.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams ever observed.
    pub fn max_live_streams(&self) -> usize {
        self.shared.max_live_streams.load(Ordering::SeqCst)
    }
}

impl MediaBackend for FakeBackend {
    type Stream = FakeStream;
    type Sink = FakeSink;

    fn is_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<(), MediaError> {
        self.shared.permission_requests.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.permission).clone()
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaError> {
        lock(&self.shared.devices).clone()
    }

    async fn request_stream(&self, constraints: &Constraints) -> Result<FakeStream, MediaError> {
        lock(&self.shared.requests).push(constraints.clone());

        let gate = lock(&self.shared.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let script = lock(&self.shared.stream_scripts)
            .pop_front()
            .unwrap_or(StreamScript::Open { video_tracks: 1 });

        match script {
            StreamScript::Fail(error) => Err(error),
            StreamScript::Open { video_tracks } => Ok(FakeStream::open(
                self.shared.clone(),
                format!("{:?}", constraints.source),
                video_tracks,
            )),
        }
    }

    fn create_sink(&self) -> FakeSink {
        FakeSink {
            shared: self.shared.clone(),
            bound: None,
            muted: false,
            inline: false,
        }
    }

    fn subscribe(&self, source: DocumentSource, listener: Listener) -> Subscription {
        match source {
            DocumentSource::Visibility => self.shared.visibility.add("visibility", listener),
            DocumentSource::DeviceChange => self.shared.device_change.add("devicechange", listener),
        }
    }
}

pub struct FakeStream {
    id: String,
    label: String,
    video_tracks: usize,
    stopped: bool,
    track_events: ListenerSet,
    shared: Arc<FakeShared>,
}

impl FakeStream {
    fn open(shared: Arc<FakeShared>, label: String, video_tracks: usize) -> Self {
        let serial = shared.streams_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let live = shared.live_streams.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_live_streams.fetch_max(live, Ordering::SeqCst);

        let track_events = ListenerSet::new();
        *lock(&shared.current_track) = Some(track_events.clone());

        Self {
            id: format!("fake-stream-{}", serial),
            label,
            video_tracks,
            stopped: false,
            track_events,
            shared,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_track_count(&self) -> usize {
        self.video_tracks
    }

    fn video_track_label(&self) -> Option<String> {
        (self.video_tracks > 0).then(|| self.label.clone())
    }

    fn subscribe_track(&self, listener: Listener) -> Subscription {
        self.track_events.add("track", listener)
    }

    fn stop_tracks(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

pub struct FakeSink {
    shared: Arc<FakeShared>,
    bound: Option<String>,
    muted: bool,
    inline: bool,
}

impl FakeSink {
    pub fn bound_stream(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_inline(&self) -> bool {
        self.inline
    }
}

impl VideoSink for FakeSink {
    type Stream = FakeStream;

    fn attach(&mut self, stream: &FakeStream) {
        self.bound = Some(stream.id.clone());
    }

    fn detach(&mut self) {
        self.bound = None;
    }

    fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_inline(&mut self, inline: bool) {
        self.inline = inline;
    }

    async fn play(&mut self) -> Result<(), MediaError> {
        lock(&self.shared.play_result).clone()
    }

    fn natural_size(&self) -> (u32, u32) {
        if self.bound.is_some() {
            *lock(&self.shared.frame_size)
        } else {
            (0, 0)
        }
    }

    fn draw_frame(&self, canvas: &mut RgbImage) -> bool {
        if self.bound.is_none() || !self.shared.frames_available.load(Ordering::SeqCst) {
            return false;
        }
        let frame_number = self.shared.frame_counter.fetch_add(1, Ordering::SeqCst);
        *canvas = synthetic_frame(frame_number, canvas.width(), canvas.height());
        true
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.shared.sink_events.add("sink", listener)
    }
}
