//! nokhwa-backed media backend
//!
//! Devices are addressed by their nokhwa index rendered as a string. There is
//! no document on a desktop host, so visibility subscriptions are inert and
//! device changes come from a 2s polling thread.
//!
//! Sink events are synthesised from frame flow: the first frame after a gap
//! emits `Playing`, and a gap longer than [`FRAME_GAP`] emits `Waiting`.

use super::{
    DocumentSource, Listener, ListenerSet, MediaBackend, MediaEvent, MediaStream, Subscription,
    VideoSink,
};
use crate::catalog::DeviceCatalog;
use crate::errors::MediaError;
use crate::types::{ConstraintSource, Constraints, DeviceDescriptor, FacingMode};
use image::imageops::{self, FilterType};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::{query, CallbackCamera};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Frame gap after which the sink reports `Waiting`.
pub const FRAME_GAP: Duration = Duration::from_millis(1000);
const WATCHDOG_TICK: Duration = Duration::from_millis(250);
const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_nokhwa_error(context: &str, error: impl std::fmt::Display) -> MediaError {
    let message = format!("{}: {}", context, error);
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized") {
        MediaError::not_allowed(message)
    } else if lowered.contains("busy") || lowered.contains("in use") || lowered.contains("resource") {
        MediaError::not_readable(message)
    } else if lowered.contains("not found") || lowered.contains("no such") {
        MediaError::not_found(message)
    } else {
        MediaError::new("NativeError", message)
    }
}

fn query_cameras() -> Result<Vec<CameraInfo>, MediaError> {
    query(ApiBackend::Auto).map_err(|e| map_nokhwa_error("Failed to query cameras", e))
}

async fn query_cameras_blocking() -> Result<Vec<CameraInfo>, MediaError> {
    tokio::task::spawn_blocking(query_cameras)
        .await
        .map_err(|e| MediaError::abort(format!("camera query task failed: {}", e)))?
}

/// Desktop camera access through nokhwa.
pub struct NativeBackend {
    device_change: ListenerSet,
    polling: Arc<AtomicBool>,
}

impl NativeBackend {
    pub fn new() -> Self {
        let backend = Self {
            device_change: ListenerSet::new(),
            polling: Arc::new(AtomicBool::new(true)),
        };
        backend.spawn_device_poll();
        backend
    }

    fn spawn_device_poll(&self) {
        let listeners = self.device_change.clone();
        let polling = self.polling.clone();

        let spawned = thread::Builder::new()
            .name("crabsnap-device-poll".to_string())
            .spawn(move || {
                let snapshot = || {
                    query_cameras()
                        .map(|cams| {
                            cams.iter()
                                .map(|c| (c.index().to_string(), c.human_name()))
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default()
                };
                let mut known = snapshot();
                while polling.load(Ordering::Relaxed) {
                    thread::sleep(DEVICE_POLL_INTERVAL);
                    if listeners.is_empty() {
                        continue;
                    }
                    let current = snapshot();
                    if current != known {
                        log::info!("Camera set changed: {} -> {} device(s)", known.len(), current.len());
                        known = current;
                        listeners.emit(MediaEvent::DeviceChange);
                    }
                }
            });

        if let Err(e) = spawned {
            log::warn!("Device change polling unavailable: {}", e);
        }
    }

    fn resolve_index(
        cameras: &[CameraInfo],
        source: &ConstraintSource,
    ) -> Result<(CameraIndex, String), MediaError> {
        let found = match source {
            ConstraintSource::ExactDevice(id) => cameras
                .iter()
                .find(|c| c.index().to_string() == *id)
                .ok_or_else(|| MediaError::overconstrained("deviceId"))?,
            ConstraintSource::Facing(mode) => cameras
                .iter()
                .enumerate()
                .find(|(position, c)| {
                    FacingMode::from_facing(DeviceCatalog::classify(&c.human_name(), *position))
                        == Some(*mode)
                })
                .map(|(_, c)| c)
                .ok_or_else(|| MediaError::overconstrained("facingMode"))?,
            ConstraintSource::Any => cameras
                .first()
                .ok_or_else(|| MediaError::not_found("no video input available"))?,
        };
        Ok((found.index().clone(), found.human_name()))
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::Relaxed);
    }
}

impl MediaBackend for NativeBackend {
    type Stream = NativeStream;
    type Sink = NativeSink;

    fn is_supported(&self) -> bool {
        nokhwa::native_api_backend().is_some()
    }

    async fn request_permission(&self) -> Result<(), MediaError> {
        // Desktop hosts gate access at the OS level; a successful query is the grant.
        let cameras = query_cameras_blocking().await?;
        log::debug!("Camera query succeeded with {} device(s)", cameras.len());
        Ok(())
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaError> {
        let cameras = query_cameras_blocking().await?;
        Ok(cameras
            .iter()
            .map(|c| DeviceDescriptor {
                group_id: c.misc(),
                ..DeviceDescriptor::video(c.index().to_string(), c.human_name())
            })
            .collect())
    }

    async fn request_stream(&self, constraints: &Constraints) -> Result<NativeStream, MediaError> {
        let constraints = constraints.clone();
        tokio::task::spawn_blocking(move || NativeStream::open(&constraints))
            .await
            .map_err(|e| MediaError::abort(format!("camera open task failed: {}", e)))?
    }

    fn create_sink(&self) -> NativeSink {
        NativeSink::default()
    }

    fn subscribe(&self, source: DocumentSource, listener: Listener) -> Subscription {
        match source {
            DocumentSource::Visibility => Subscription::noop("visibility"),
            DocumentSource::DeviceChange => self.device_change.add("devicechange", listener),
        }
    }
}

/// State shared between the capture callback, the watchdog and the sink.
#[derive(Default)]
struct FrameState {
    latest: Mutex<Option<RgbImage>>,
    last_frame_at: Mutex<Option<Instant>>,
    frames: AtomicU64,
    flowing: AtomicBool,
    stopped: AtomicBool,
    sink_events: Mutex<Option<ListenerSet>>,
    track_events: ListenerSet,
}

impl FrameState {
    fn emit_sink(&self, event: MediaEvent) {
        let listeners = lock(&self.sink_events).clone();
        if let Some(listeners) = listeners {
            listeners.emit(event);
        }
    }

    fn on_frame(&self, frame: RgbImage) {
        *lock(&self.latest) = Some(frame);
        *lock(&self.last_frame_at) = Some(Instant::now());
        self.frames.fetch_add(1, Ordering::Relaxed);
        if !self.flowing.swap(true, Ordering::AcqRel) {
            self.emit_sink(MediaEvent::Playing);
        }
    }

    fn check_gap(&self) {
        let Some(last) = *lock(&self.last_frame_at) else {
            return;
        };
        if last.elapsed() > FRAME_GAP && self.flowing.swap(false, Ordering::AcqRel) {
            log::debug!("No frame for {:?}, reporting waiting", last.elapsed());
            self.emit_sink(MediaEvent::Waiting);
        }
    }
}

pub struct NativeStream {
    id: String,
    label: String,
    camera: Option<CallbackCamera>,
    state: Arc<FrameState>,
}

impl NativeStream {
    fn open(constraints: &Constraints) -> Result<Self, MediaError> {
        let cameras = query_cameras()?;
        let (index, label) = NativeBackend::resolve_index(&cameras, &constraints.source)?;

        let format = CameraFormat::new(
            Resolution::new(constraints.ideal_width, constraints.ideal_height),
            FrameFormat::MJPEG,
            constraints.max_frame_rate,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let state = Arc::new(FrameState::default());
        let callback_state = state.clone();
        let mut camera = CallbackCamera::new(index.clone(), requested, move |buffer| {
            match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => {
                    let (width, height) = decoded.dimensions();
                    if let Some(frame) = RgbImage::from_raw(width, height, decoded.into_raw()) {
                        callback_state.on_frame(frame);
                    }
                }
                Err(e) => log::trace!("Dropping undecodable frame: {}", e),
            }
        })
        .map_err(|e| map_nokhwa_error("Failed to initialize camera", e))?;

        camera
            .open_stream()
            .map_err(|e| map_nokhwa_error("Failed to start stream", e))?;

        let stream = Self {
            id: format!("native-{}-{}", index, uuid::Uuid::new_v4()),
            label,
            camera: Some(camera),
            state,
        };
        stream.spawn_watchdog();
        log::info!("Opened camera {} ({})", index, stream.label);
        Ok(stream)
    }

    fn spawn_watchdog(&self) {
        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name("crabsnap-frame-watchdog".to_string())
            .spawn(move || {
                while !state.stopped.load(Ordering::Acquire) {
                    thread::sleep(WATCHDOG_TICK);
                    state.check_gap();
                }
            });
        if let Err(e) = spawned {
            log::warn!("Frame watchdog unavailable: {}", e);
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.state.frames.load(Ordering::Relaxed)
    }
}

impl MediaStream for NativeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_track_count(&self) -> usize {
        usize::from(self.camera.is_some())
    }

    fn video_track_label(&self) -> Option<String> {
        Some(self.label.clone())
    }

    fn subscribe_track(&self, listener: Listener) -> Subscription {
        self.state.track_events.add("track", listener)
    }

    fn stop_tracks(&mut self) {
        if self.state.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera {}: {}", self.id, e);
            }
        }
        *lock(&self.state.sink_events) = None;
        log::debug!("Stopped stream {}", self.id);
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Off-screen sink: keeps the attached stream's latest frame.
#[derive(Default)]
pub struct NativeSink {
    attached: Option<Arc<FrameState>>,
    events: ListenerSet,
    muted: bool,
    inline: bool,
}

impl VideoSink for NativeSink {
    type Stream = NativeStream;

    fn attach(&mut self, stream: &NativeStream) {
        *lock(&stream.state.sink_events) = Some(self.events.clone());
        self.attached = Some(stream.state.clone());
    }

    fn detach(&mut self) {
        if let Some(state) = self.attached.take() {
            *lock(&state.sink_events) = None;
        }
    }

    fn is_bound(&self) -> bool {
        self.attached.is_some()
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_inline(&mut self, inline: bool) {
        self.inline = inline;
    }

    async fn play(&mut self) -> Result<(), MediaError> {
        match &self.attached {
            Some(state) if !state.stopped.load(Ordering::Acquire) => Ok(()),
            Some(_) => Err(MediaError::abort("attached stream has stopped")),
            None => Err(MediaError::abort("no stream attached")),
        }
    }

    fn natural_size(&self) -> (u32, u32) {
        self.attached
            .as_ref()
            .and_then(|state| lock(&state.latest).as_ref().map(|f| f.dimensions()))
            .unwrap_or((0, 0))
    }

    fn draw_frame(&self, canvas: &mut RgbImage) -> bool {
        let Some(state) = &self.attached else {
            return false;
        };
        let latest = lock(&state.latest);
        let Some(frame) = latest.as_ref() else {
            return false;
        };

        if frame.dimensions() == canvas.dimensions() {
            canvas.copy_from_slice(frame.as_raw());
        } else {
            *canvas = imageops::resize(frame, canvas.width(), canvas.height(), FilterType::Triangle);
        }
        true
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.events.add("sink", listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(map_nokhwa_error("open", "Permission denied").name, "NotAllowedError");
        assert_eq!(map_nokhwa_error("open", "Device or resource busy").name, "NotReadableError");
        assert_eq!(map_nokhwa_error("open", "No such device").name, "NotFoundError");
        assert_eq!(map_nokhwa_error("open", "weird").name, "NativeError");
    }

    #[test]
    fn test_unbound_sink() {
        let sink = NativeSink::default();
        let mut canvas = RgbImage::new(4, 4);
        assert!(!sink.is_bound());
        assert_eq!(sink.natural_size(), (0, 0));
        assert!(!sink.draw_frame(&mut canvas));
    }

    #[test]
    fn test_frame_flow_events() {
        let state = FrameState::default();
        let events = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.add("test", Arc::new(move |e: MediaEvent| sink.lock().unwrap().push(e)));
        *lock(&state.sink_events) = Some(events);

        state.on_frame(RgbImage::new(2, 2));
        state.on_frame(RgbImage::new(2, 2));
        *lock(&state.last_frame_at) = Some(Instant::now() - FRAME_GAP * 2);
        state.check_gap();
        state.check_gap();

        assert_eq!(*seen.lock().unwrap(), vec![MediaEvent::Playing, MediaEvent::Waiting]);
        assert_eq!(state.frames.load(Ordering::Relaxed), 2);
    }
}
