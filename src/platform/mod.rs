//! Hardware media API contract
//!
//! The lifecycle manager never talks to a camera directly. Everything it needs
//! from the platform (permission prompt, device list, stream acquisition, the
//! video sink and its events) goes through the traits in this module, so the
//! same coordinator drives the native nokhwa backend and the in-memory test
//! backend.

pub mod native;

use crate::errors::MediaError;
use crate::types::{Constraints, DeviceDescriptor};
use image::RgbImage;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub use native::{NativeBackend, NativeSink, NativeStream};

/// Raw event delivered by a sink, a track or the surrounding document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaEvent {
    /// An explicit `play()` on the sink resolved.
    PlayResolved,
    Playing,
    Waiting,
    Stalled,
    Ended,
    Error,
    TrackMute,
    TrackUnmute,
    TrackEnded,
    VisibilityHidden,
    VisibilityVisible,
    DeviceChange,
}

/// Document-level event sources a backend can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Visibility,
    DeviceChange,
}

pub type Listener = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// Deregistration handle for one attached listener.
///
/// Dropping the handle detaches the listener; releasing twice is impossible
/// because `release` consumes it.
pub struct Subscription {
    label: &'static str,
    undo: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(label: &'static str, undo: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            undo: Some(Box::new(undo)),
        }
    }

    /// A handle with nothing to undo, for backends without the event source.
    pub fn noop(label: &'static str) -> Self {
        Self { label, undo: None }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            undo();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("attached", &self.undo.is_some())
            .finish()
    }
}

/// Ordered set of subscriptions owned by one stream binding.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    handles: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.handles.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle, most recent first.
    pub fn release_all(&mut self) {
        while let Some(handle) = self.handles.pop() {
            log::trace!("Releasing listener: {}", handle.label());
            handle.release();
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[derive(Default)]
struct ListenerSetInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Listener bookkeeping shared by backend implementations.
///
/// Emitting snapshots the listener list first, so a listener may detach
/// itself (or others) while being called.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<Mutex<ListenerSetInner>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, label: &'static str, listener: Listener) -> Subscription {
        let id = {
            let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            g.next_id += 1;
            let id = g.next_id;
            g.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<ListenerSetInner>> = Arc::downgrade(&self.inner);
        Subscription::new(label, move || {
            if let Some(inner) = weak.upgrade() {
                let mut g = inner.lock().unwrap_or_else(PoisonError::into_inner);
                g.listeners.retain(|(existing, _)| *existing != id);
            }
        })
    }

    pub fn emit(&self, event: MediaEvent) {
        for listener in self.snapshot() {
            listener(event);
        }
    }

    pub fn snapshot(&self) -> Vec<Listener> {
        let g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        g.listeners.iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hardware media API: permission, enumeration, acquisition and document events.
pub trait MediaBackend: Send + Sync + 'static {
    type Stream: MediaStream;
    type Sink: VideoSink<Stream = Self::Stream>;

    /// `false` when the media API is absent (insecure context, old runtime).
    fn is_supported(&self) -> bool;

    fn request_permission(&self) -> impl Future<Output = Result<(), MediaError>> + Send;

    fn enumerate_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceDescriptor>, MediaError>> + Send;

    fn request_stream(
        &self,
        constraints: &Constraints,
    ) -> impl Future<Output = Result<Self::Stream, MediaError>> + Send;

    fn create_sink(&self) -> Self::Sink;

    fn subscribe(&self, source: DocumentSource, listener: Listener) -> Subscription;
}

/// A live hardware stream carrying exactly one video track.
pub trait MediaStream: Send + 'static {
    fn id(&self) -> &str;

    fn video_track_count(&self) -> usize;

    fn video_track_label(&self) -> Option<String>;

    /// Track `mute`, `unmute` and `ended`.
    fn subscribe_track(&self, listener: Listener) -> Subscription;

    /// Stop every track. Calling it on a stopped stream does nothing.
    fn stop_tracks(&mut self);
}

/// The single element a stream is rendered into.
pub trait VideoSink: Send + 'static {
    type Stream: MediaStream;

    fn attach(&mut self, stream: &Self::Stream);

    fn detach(&mut self);

    fn is_bound(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Inline playback; required for autoplay without a user gesture on mobile.
    fn set_inline(&mut self, inline: bool);

    fn play(&mut self) -> impl Future<Output = Result<(), MediaError>> + Send;

    /// Native frame size; `(0, 0)` until the first frame has been decoded.
    fn natural_size(&self) -> (u32, u32);

    /// Draw the current frame scaled to the canvas. `false` when there is no frame.
    fn draw_frame(&self, canvas: &mut RgbImage) -> bool;

    /// Sink `playing`, `waiting`, `stalled`, `ended` and `error`.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listener_set_detaches_on_drop() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = set.add("test", Arc::new(move |_: MediaEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        set.emit(MediaEvent::Playing);
        assert_eq!(set.len(), 1);
        sub.release();
        set.emit(MediaEvent::Playing);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_registry_releases_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        for label in ["first", "second", "third"] {
            let order = order.clone();
            registry.push(Subscription::new(label, move || {
                order.lock().unwrap().push(label);
            }));
        }

        registry.release_all();
        assert!(registry.is_empty());
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);

        // Second flush has nothing left to undo.
        registry.release_all();
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_release_after_set_dropped() {
        let set = ListenerSet::new();
        let sub = set.add("orphan", Arc::new(|_: MediaEvent| {}));
        drop(set);
        sub.release();
    }
}
