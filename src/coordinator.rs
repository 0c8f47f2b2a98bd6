//! Camera lifecycle state machine
//!
//! `Idle → PermissionPending → Enumerating → Starting → Active → Closing → Idle`,
//! with `Error` reachable from the permission, start and active phases.
//!
//! The coordinator is a single-owner value: every operation takes `&mut self`,
//! so no two hardware acquisitions can overlap. To abandon a pending `open()`
//! (for example on a caller timeout) drop its future and call [`close`].
//!
//! Raw events are not processed in the background. The owner drives them with
//! [`wait_for_event`] or [`process_pending`], typically from a `tokio::select!`
//! loop next to its own UI commands. Each event carries the instant its
//! listener fired, so debounce timing does not depend on how promptly the
//! owner drains; [`capture`] absorbs whatever is queued before it judges the
//! feed.
//!
//! [`close`]: LifecycleCoordinator::close
//! [`wait_for_event`]: LifecycleCoordinator::wait_for_event
//! [`process_pending`]: LifecycleCoordinator::process_pending
//! [`capture`]: LifecycleCoordinator::capture

use crate::capture::CaptureEngine;
use crate::catalog::DeviceCatalog;
use crate::config::CrabSnapConfig;
use crate::errors::{CameraError, RetryFrom};
use crate::platform::{MediaBackend, MediaEvent};
use crate::stability::{Stability, StabilityState};
use crate::stream::{EventDisposition, RawEvent, StartOutcome, StreamController};
use crate::types::{BinaryFile, CameraDevice, CapturedImage, StreamSelector};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type CaptureCallback = Box<dyn FnMut(Option<CapturedImage>, Option<BinaryFile>) + Send>;
pub type StateCallback = Box<dyn FnMut(&LifecycleState) + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    PermissionPending,
    Enumerating,
    Starting {
        selector: StreamSelector,
    },
    Active {
        selector: StreamSelector,
        stability: Stability,
    },
    Closing,
    Error {
        error: CameraError,
        retry: RetryFrom,
    },
}

impl LifecycleState {
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::PermissionPending => "permission-pending",
            LifecycleState::Enumerating => "enumerating",
            LifecycleState::Starting { .. } => "starting",
            LifecycleState::Active {
                stability: Stability::Stable,
                ..
            } => "active-stable",
            LifecycleState::Active {
                stability: Stability::Reconnecting,
                ..
            } => "active-reconnecting",
            LifecycleState::Active { .. } => "active",
            LifecycleState::Closing => "closing",
            LifecycleState::Error { .. } => "error",
        }
    }

    /// Spinner: something is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LifecycleState::PermissionPending
                | LifecycleState::Enumerating
                | LifecycleState::Starting { .. }
                | LifecycleState::Closing
        )
    }

    pub fn can_capture(&self) -> bool {
        matches!(
            self,
            LifecycleState::Active {
                stability: Stability::Stable,
                ..
            }
        )
    }

    /// Error banner with a retry button; `Unsupported` shows guidance only.
    pub fn shows_retry(&self) -> bool {
        matches!(self, LifecycleState::Error { retry, .. } if *retry != RetryFrom::Never)
    }

    pub fn error(&self) -> Option<&CameraError> {
        match self {
            LifecycleState::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub struct LifecycleCoordinator<B: MediaBackend> {
    backend: Arc<B>,
    config: CrabSnapConfig,
    controller: StreamController<B>,
    capture_engine: CaptureEngine,
    events: mpsc::UnboundedReceiver<RawEvent>,
    /// Absorbed events whose async half (resume, re-enumeration) is still owed.
    follow_ups: VecDeque<(u64, MediaEvent)>,
    state: LifecycleState,
    devices: Vec<CameraDevice>,
    last_selector: Option<StreamSelector>,
    preferred_device: Option<String>,
    on_state_change: Option<StateCallback>,
    on_capture: Option<CaptureCallback>,
}

impl<B: MediaBackend> LifecycleCoordinator<B> {
    pub fn new(backend: B, config: CrabSnapConfig) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::Config)?;

        let backend = Arc::new(backend);
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = StreamController::new(backend.clone(), &config, tx);
        let capture_engine = CaptureEngine::from_config(&config.capture);

        Ok(Self {
            backend,
            config,
            controller,
            capture_engine,
            events: rx,
            follow_ups: VecDeque::new(),
            state: LifecycleState::Idle,
            devices: Vec::new(),
            last_selector: None,
            preferred_device: None,
            on_state_change: None,
            on_capture: None,
        })
    }

    pub fn with_defaults(backend: B) -> Self {
        Self::new(backend, CrabSnapConfig::default())
            .unwrap_or_else(|_| unreachable!("default configuration is valid"))
    }

    pub fn on_state_change(&mut self, callback: impl FnMut(&LifecycleState) + Send + 'static) {
        self.on_state_change = Some(Box::new(callback));
    }

    /// Open this device id first when it is enumerated; otherwise the preferred facing wins.
    pub fn set_preferred_device(&mut self, id: Option<String>) {
        self.preferred_device = id;
    }

    /// `(Some, Some)` for a capture, `(None, None)` for an explicit skip.
    pub fn on_capture(
        &mut self,
        callback: impl FnMut(Option<CapturedImage>, Option<BinaryFile>) + Send + 'static,
    ) {
        self.on_capture = Some(Box::new(callback));
    }

    /// Ask for permission, pick a camera and start streaming.
    ///
    /// Ends in `Active` or `Error`; the error is also returned.
    pub async fn open(&mut self) -> Result<(), CameraError> {
        if self.state != LifecycleState::Idle {
            return Err(CameraError::InvalidState(format!(
                "open() called while {}",
                self.state
            )));
        }
        log::info!("Opening camera");
        self.acquire_from_permission().await
    }

    async fn acquire_from_permission(&mut self) -> Result<(), CameraError> {
        self.set_state(LifecycleState::PermissionPending);

        if !self.backend.is_supported() {
            return self.fail(CameraError::Unsupported(
                "media devices API is not available".to_string(),
            ));
        }
        if let Err(e) = self.backend.request_permission().await {
            log::warn!("Camera permission not granted: {}", e);
            return self.fail(e.classify());
        }

        self.set_state(LifecycleState::Enumerating);
        self.devices = DeviceCatalog::enumerate(self.backend.as_ref()).await;

        let selector = self.first_selector();
        match self.try_start(&selector).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn first_selector(&self) -> StreamSelector {
        let requested = self
            .preferred_device
            .as_deref()
            .and_then(|id| self.devices.iter().find(|d| d.id == id));
        match requested {
            Some(device) => StreamSelector::device(device),
            None => {
                if let Some(id) = &self.preferred_device {
                    log::warn!("Requested camera {} not found, using preferred facing", id);
                }
                DeviceCatalog::initial_selector(&self.devices, self.config.stream.preferred_facing)
            }
        }
    }

    /// Enter `Starting` and bring up `selector`, replacing any current binding.
    ///
    /// Leaves the state at `Starting` on failure; callers decide whether that
    /// becomes `Error`.
    async fn try_start(&mut self, selector: &StreamSelector) -> Result<(), CameraError> {
        self.set_state(LifecycleState::Starting {
            selector: selector.clone(),
        });
        self.last_selector = Some(selector.clone());

        let outcome = if self.controller.active_bindings() > 0 {
            self.controller.switch(selector).await?
        } else {
            self.controller.start(selector).await?
        };

        match outcome {
            StartOutcome::Started(used) => {
                self.last_selector = Some(used.clone());
                let stability = self.controller.stability();
                self.set_state(LifecycleState::Active {
                    selector: used,
                    stability,
                });
                Ok(())
            }
            StartOutcome::AlreadyStarting => Ok(()),
        }
    }

    fn fail(&mut self, error: CameraError) -> Result<(), CameraError> {
        self.enter_error(error.clone());
        Err(error)
    }

    fn enter_error(&mut self, error: CameraError) {
        self.controller.stop();
        log::error!("Camera error: {}", error);
        let retry = error.retry_from();
        self.set_state(LifecycleState::Error { error, retry });
    }

    /// Leave `Error` the way its error class allows.
    pub async fn retry(&mut self) -> Result<(), CameraError> {
        let (error, retry) = match &self.state {
            LifecycleState::Error { error, retry } => (error.clone(), *retry),
            other => {
                return Err(CameraError::InvalidState(format!(
                    "retry() called while {}",
                    other
                )))
            }
        };

        match retry {
            RetryFrom::Never => {
                log::warn!("Retry refused for {}", error);
                Err(error)
            }
            RetryFrom::Permission => {
                log::info!("Retrying from permission request after: {}", error);
                self.acquire_from_permission().await
            }
            RetryFrom::Start => {
                log::info!("Retrying stream start after: {}", error);
                let selector = self.last_selector.clone().unwrap_or_else(|| {
                    DeviceCatalog::initial_selector(&self.devices, self.config.stream.preferred_facing)
                });
                match self.try_start(&selector).await {
                    Ok(()) => Ok(()),
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    /// Move to the next camera.
    ///
    /// When the new camera fails and `revert_on_switch_failure` is set, the
    /// previous camera is tried once; if that works the state is `Active`
    /// again but the switch error is still returned.
    pub async fn switch_camera(&mut self) -> Result<(), CameraError> {
        let preferred = self.config.stream.preferred_facing;
        let current = match &self.state {
            LifecycleState::Active { selector, .. } => selector.clone(),
            LifecycleState::Error { .. } => self
                .last_selector
                .clone()
                .unwrap_or_else(|| DeviceCatalog::initial_selector(&self.devices, preferred)),
            other => {
                return Err(CameraError::InvalidState(format!(
                    "switch_camera() called while {}",
                    other
                )))
            }
        };

        let next = DeviceCatalog::next_candidate(&self.devices, &current, preferred);
        log::info!("Switching camera: {} -> {}", current, next);

        let error = match self.try_start(&next).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !self.config.stream.revert_on_switch_failure || next == current {
            return self.fail(error);
        }

        log::warn!("Switch to {} failed ({}), reverting to {}", next, error, current);
        match self.try_start(&current).await {
            Ok(()) => Err(error),
            Err(revert_error) => self.fail(revert_error),
        }
    }

    /// Take the photo. Only legal while the feed is `Active` and stable.
    ///
    /// On success the image and file go to the capture callback and the
    /// camera closes. A failed encode leaves the stream running.
    pub fn capture(&mut self) -> Result<(), CameraError> {
        self.absorb_queued();
        self.apply_stability();

        if !self.state.can_capture() {
            log::warn!("Capture refused while {}", self.state);
            return Err(CameraError::CaptureFailed(format!(
                "camera feed is not stable ({})",
                self.state
            )));
        }

        let (image, file) = self.capture_engine.capture(self.controller.sink())?;
        match self.on_capture.as_mut() {
            Some(callback) => callback(Some(image), Some(file)),
            None => log::warn!("No capture handler registered, discarding image"),
        }

        self.close();
        Ok(())
    }

    /// Bypass the capture step: reports `(None, None)` and closes.
    pub fn skip(&mut self) {
        log::info!("Capture skipped");
        if let Some(callback) = self.on_capture.as_mut() {
            callback(None, None);
        }
        self.close();
    }

    /// Tear everything down and return to `Idle`. Safe in any state, any number of times.
    pub fn close(&mut self) {
        if self.state == LifecycleState::Idle {
            self.controller.stop();
            return;
        }

        log::info!("Closing camera from {}", self.state);
        self.set_state(LifecycleState::Closing);
        self.controller.stop();
        self.devices.clear();
        self.last_selector = None;
        self.follow_ups.clear();
        while self.events.try_recv().is_ok() {}
        self.set_state(LifecycleState::Idle);
    }

    /// Wait for one raw event or one debounce deadline and apply it.
    ///
    /// Cancel-safe while waiting: dropping the future before an event arrives
    /// loses nothing.
    pub async fn wait_for_event(&mut self) {
        if self.follow_ups.is_empty() {
            let deadline = self.controller.next_deadline();

            tokio::select! {
                biased;
                received = self.events.recv() => {
                    if let Some(raw) = received {
                        self.absorb(raw);
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            }
        }

        self.run_follow_ups().await;
        self.apply_stability();
    }

    /// Apply every queued event and expired timer without waiting.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            handled += self.absorb_queued();
            if self.follow_ups.is_empty() {
                break;
            }
            // A resume queues its resolved play; pick that up in the same pass.
            self.run_follow_ups().await;
        }
        self.apply_stability();
        handled
    }

    /// Drive events until the feed is stable, an error occurs, or `timeout` passes.
    pub async fn wait_for_stable(&mut self, timeout: Duration) -> Result<(), CameraError> {
        let deadline = Instant::now() + timeout;
        loop {
            match &self.state {
                LifecycleState::Active {
                    stability: Stability::Stable,
                    ..
                } => return Ok(()),
                LifecycleState::Active { .. } | LifecycleState::Starting { .. } => {}
                LifecycleState::Error { error, .. } => return Err(error.clone()),
                other => {
                    return Err(CameraError::InvalidState(format!(
                        "no stream to wait for while {}",
                        other
                    )))
                }
            }

            if tokio::time::timeout_at(deadline, self.wait_for_event())
                .await
                .is_err()
            {
                return Err(CameraError::Stream(format!(
                    "feed not stable after {} ms",
                    timeout.as_millis()
                )));
            }
        }
    }

    /// Feed one event to the debouncer at the instant it arrived, after
    /// replaying any timer that expired before it.
    fn absorb(&mut self, (generation, at, event): RawEvent) {
        if self.controller.is_current(generation) {
            self.apply_stability_at(at);
        }
        match self.controller.absorb(generation, at, event) {
            EventDisposition::Stale => {}
            EventDisposition::Signalled(_) if event != MediaEvent::DeviceChange => {}
            EventDisposition::Signalled(_) | EventDisposition::NeedsResume => {
                self.follow_ups.push_back((generation, event));
            }
        }
    }

    fn absorb_queued(&mut self) -> usize {
        let mut absorbed = 0;
        while let Ok(raw) = self.events.try_recv() {
            self.absorb(raw);
            absorbed += 1;
        }
        absorbed
    }

    async fn run_follow_ups(&mut self) {
        while let Some((generation, event)) = self.follow_ups.pop_front() {
            if !self.controller.is_current(generation) {
                continue;
            }
            if event == MediaEvent::DeviceChange {
                if matches!(self.state, LifecycleState::Active { .. }) {
                    self.refresh_devices().await;
                }
            } else {
                self.controller.resume().await;
            }
        }
    }

    /// Re-enumerate after a device change; reacquire if the bound camera vanished.
    async fn refresh_devices(&mut self) {
        self.devices = DeviceCatalog::enumerate(self.backend.as_ref()).await;

        let Some(id) = self
            .controller
            .selector()
            .and_then(|s| s.device_id())
            .map(str::to_owned)
        else {
            self.controller.resume().await;
            return;
        };
        if DeviceCatalog::contains(&self.devices, &id) {
            // The change was elsewhere; re-confirm playback so the down signal clears.
            self.controller.resume().await;
            return;
        }

        log::warn!("Bound camera {} disappeared, reacquiring", id);
        let selector =
            DeviceCatalog::initial_selector(&self.devices, self.config.stream.preferred_facing);
        if let Err(e) = self.try_start(&selector).await {
            self.enter_error(e);
        }
    }

    fn apply_stability(&mut self) {
        self.apply_stability_at(Instant::now());
    }

    fn apply_stability_at(&mut self, now: Instant) {
        let Some(stability) = self.controller.poll_stability_at(now) else {
            return;
        };
        if let LifecycleState::Active { selector, .. } = &self.state {
            let selector = selector.clone();
            log::info!("Camera feed is now {:?}", stability);
            self.set_state(LifecycleState::Active {
                selector,
                stability,
            });
        }
    }

    fn set_state(&mut self, next: LifecycleState) {
        if self.state == next {
            return;
        }
        log::debug!("Lifecycle: {} -> {}", self.state, next);
        self.state = next;
        if let Some(callback) = self.on_state_change.as_mut() {
            callback(&self.state);
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    pub fn stability_state(&self) -> StabilityState {
        self.controller.stability_state()
    }

    pub fn active_bindings(&self) -> usize {
        self.controller.active_bindings()
    }

    pub fn attached_listeners(&self) -> usize {
        self.controller.attached_listeners()
    }

    pub fn config(&self) -> &CrabSnapConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: MediaBackend> Drop for LifecycleCoordinator<B> {
    fn drop(&mut self) {
        self.close();
    }
}
