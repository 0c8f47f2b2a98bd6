//! Stream acquisition and release
//!
//! The controller owns the one video sink and at most one stream binding.
//! Every listener it attaches is tagged with the binding's generation and
//! only enqueues `(generation, arrived_at, event)`; events whose generation
//! is no longer current are dropped, so callbacks queued before a `stop()`
//! cannot touch the next binding. The arrival stamp is what the debouncer
//! times against, however late the owner drains the queue.

use crate::assert_invariant;
use crate::config::CrabSnapConfig;
use crate::errors::CameraError;
use crate::platform::{
    DocumentSource, Listener, MediaBackend, MediaEvent, MediaStream, SubscriptionRegistry,
    VideoSink,
};
use crate::stability::{Signal, Stability, StabilityDebouncer, StabilityState};
use crate::types::{ConstraintSource, Constraints, FacingMode, StreamSelector};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Raw event tagged with the generation of the binding that produced it and
/// the moment the listener saw it.
pub type RawEvent = (u64, Instant, MediaEvent);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Bound; carries the selector actually used, which differs from the
    /// requested one when the constraints had to be relaxed.
    Started(StreamSelector),
    /// Another start is still in progress; nothing was done.
    AlreadyStarting,
}

/// What the controller did with one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// From a binding that no longer exists.
    Stale,
    /// Fed to the debouncer.
    Signalled(Signal),
    /// The page became visible; the sink should be asked to play again.
    NeedsResume,
}

struct StreamBinding<S> {
    generation: u64,
    stream: S,
    selector: StreamSelector,
    subscriptions: SubscriptionRegistry,
}

pub struct StreamController<B: MediaBackend> {
    backend: Arc<B>,
    sink: B::Sink,
    binding: Option<StreamBinding<B::Stream>>,
    starting: bool,
    generation: u64,
    debouncer: StabilityDebouncer,
    events: mpsc::UnboundedSender<RawEvent>,
    ideal_resolution: [u32; 2],
    max_frame_rate: u32,
    fallback_facing: FacingMode,
}

impl<B: MediaBackend> StreamController<B> {
    pub fn new(
        backend: Arc<B>,
        config: &CrabSnapConfig,
        events: mpsc::UnboundedSender<RawEvent>,
    ) -> Self {
        let sink = backend.create_sink();
        Self {
            backend,
            sink,
            binding: None,
            starting: false,
            generation: 0,
            debouncer: StabilityDebouncer::from_config(&config.stability),
            events,
            ideal_resolution: config.stream.ideal_resolution,
            max_frame_rate: config.stream.max_frame_rate,
            fallback_facing: config.stream.preferred_facing,
        }
    }

    /// Acquire a stream for `selector` and bind it to the sink.
    ///
    /// A call made while another start is in flight is a no-op. An
    /// unsatisfiable request is relaxed once (exact id to facing mode, facing
    /// mode to any camera) before the error is surfaced.
    pub async fn start(&mut self, selector: &StreamSelector) -> Result<StartOutcome, CameraError> {
        if self.starting {
            log::debug!("Start for {} ignored: a start is already in progress", selector);
            return Ok(StartOutcome::AlreadyStarting);
        }
        if self.binding.is_some() {
            return Err(CameraError::InvalidState(
                "a stream is already bound; stop it before starting another".to_string(),
            ));
        }

        self.starting = true;
        self.generation += 1;
        let generation = self.generation;

        // If this future is dropped mid-acquisition, `starting` stays set until
        // the next `stop()`, and the backend drops the late stream with it.
        let acquired = self.acquire(selector).await;
        self.starting = false;

        let (stream, used) = acquired?;
        if stream.video_track_count() == 0 {
            let mut stream = stream;
            stream.stop_tracks();
            return Err(CameraError::Stream("stream has no video track".to_string()));
        }

        self.bind(generation, stream, used.clone());
        self.play_current().await;
        Ok(StartOutcome::Started(used))
    }

    async fn acquire(
        &self,
        selector: &StreamSelector,
    ) -> Result<(B::Stream, StreamSelector), CameraError> {
        let constraints =
            Constraints::for_selector(selector, self.ideal_resolution, self.max_frame_rate);
        log::info!(
            "Requesting camera stream for {} ({}x{} @ {} fps max)",
            selector,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.max_frame_rate
        );

        let error = match self.backend.request_stream(&constraints).await {
            Ok(stream) => return Ok((stream, selector.clone())),
            Err(e) => e,
        };

        if !error.is_overconstrained() {
            log::error!("Camera stream request failed: {}", error);
            return Err(error.classify());
        }

        let Some(relaxed) = constraints.relaxed(self.fallback_facing, selector.facing_mode()) else {
            return Err(error.classify());
        };
        let used = match &relaxed.source {
            ConstraintSource::Facing(mode) => StreamSelector::facing(*mode),
            ConstraintSource::Any => StreamSelector::Any,
            ConstraintSource::ExactDevice(_) => selector.clone(),
        };
        log::warn!(
            "Constraints for {} unsatisfiable ({}), retrying with {:?}",
            selector,
            error,
            relaxed.source
        );

        match self.backend.request_stream(&relaxed).await {
            Ok(stream) => Ok((stream, used)),
            Err(e) => {
                log::error!("Relaxed camera stream request failed: {}", e);
                Err(e.classify())
            }
        }
    }

    fn bind(&mut self, generation: u64, stream: B::Stream, selector: StreamSelector) {
        assert_invariant!(
            self.binding.is_none(),
            "at most one stream binding",
            "StreamController::bind"
        );

        self.sink.attach(&stream);
        self.sink.set_muted(true);
        self.sink.set_inline(true);

        let mut subscriptions = SubscriptionRegistry::new();
        subscriptions.push(self.sink.subscribe(self.listener(generation)));
        subscriptions.push(stream.subscribe_track(self.listener(generation)));
        subscriptions.push(
            self.backend
                .subscribe(DocumentSource::Visibility, self.listener(generation)),
        );
        subscriptions.push(
            self.backend
                .subscribe(DocumentSource::DeviceChange, self.listener(generation)),
        );

        log::info!(
            "Bound stream {} ({}) to sink, generation {}",
            stream.id(),
            stream.video_track_label().unwrap_or_default(),
            generation
        );
        self.binding = Some(StreamBinding {
            generation,
            stream,
            selector,
            subscriptions,
        });
    }

    fn listener(&self, generation: u64) -> Listener {
        let events = self.events.clone();
        Arc::new(move |event: MediaEvent| {
            // The receiver only disappears with the coordinator.
            let _ = events.send((generation, Instant::now(), event));
        })
    }

    async fn play_current(&mut self) -> bool {
        let Some(generation) = self.current_generation() else {
            return false;
        };
        match self.sink.play().await {
            Ok(()) => {
                let _ = self
                    .events
                    .send((generation, Instant::now(), MediaEvent::PlayResolved));
                true
            }
            Err(e) => {
                // Autoplay can be refused; a later `playing` event still counts.
                log::warn!("Sink play() rejected: {}", e);
                false
            }
        }
    }

    /// Release the binding. Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        self.starting = false;
        self.generation += 1;
        self.debouncer.reset();

        if let Some(mut binding) = self.binding.take() {
            binding.stream.stop_tracks();
            self.sink.detach();
            binding.subscriptions.release_all();
            log::info!(
                "Released stream {} (generation {})",
                binding.stream.id(),
                binding.generation
            );
        }
    }

    /// `stop()` then `start(selector)`.
    pub async fn switch(&mut self, selector: &StreamSelector) -> Result<StartOutcome, CameraError> {
        self.stop();
        self.start(selector).await
    }

    /// Route one raw event observed at `at`: drop it if stale, debounce it,
    /// or report that the sink needs resuming.
    ///
    /// Synchronous so the owner can absorb the queue right before a capture.
    pub fn absorb(&mut self, generation: u64, at: Instant, event: MediaEvent) -> EventDisposition {
        if !self.is_current(generation) {
            log::debug!("Ignoring stale {:?} from generation {}", event, generation);
            return EventDisposition::Stale;
        }

        match Signal::from_event(event) {
            Some(signal) => {
                log::debug!("{:?} -> {:?}", event, signal);
                self.debouncer.signal(signal, at);
                EventDisposition::Signalled(signal)
            }
            None => EventDisposition::NeedsResume,
        }
    }

    /// Ask the sink to play again; a resolved play is reported as `PlayResolved`.
    pub async fn resume(&mut self) -> bool {
        self.play_current().await
    }

    /// Apply debounce timers that expired by `now`; returns the new stability
    /// if it changed. Called with an event's arrival time, it replays timers
    /// in order before that event is absorbed.
    pub fn poll_stability_at(&mut self, now: Instant) -> Option<Stability> {
        self.debouncer.poll(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    pub fn stability(&self) -> Stability {
        self.debouncer.stability()
    }

    pub fn stability_state(&self) -> StabilityState {
        self.debouncer.state()
    }

    pub fn is_starting(&self) -> bool {
        self.starting
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == Some(generation)
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.binding.as_ref().map(|b| b.generation)
    }

    pub fn active_bindings(&self) -> usize {
        usize::from(self.binding.is_some())
    }

    pub fn attached_listeners(&self) -> usize {
        self.binding
            .as_ref()
            .map_or(0, |b| b.subscriptions.len())
    }

    pub fn selector(&self) -> Option<&StreamSelector> {
        self.binding.as_ref().map(|b| &b.selector)
    }

    pub fn sink(&self) -> &B::Sink {
        &self.sink
    }
}

impl<B: MediaBackend> Drop for StreamController<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
