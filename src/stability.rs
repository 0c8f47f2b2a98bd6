//! Debounced stream stability
//!
//! Raw sink, track and document events flicker during startup and short
//! buffering. The debouncer turns them into a single judgement, "frames are
//! flowing" or "reconnecting", using two independent timers: a direction
//! must persist for its full delay, uncontradicted, before it is trusted.
//!
//! Timers are deadlines rather than spawned tasks. The coordinator sleeps
//! until [`StabilityDebouncer::next_deadline`] and then calls
//! [`StabilityDebouncer::poll`]; cancelling a timer is clearing its deadline.

use crate::assert_invariant;
use crate::config::StabilityConfig;
use crate::platform::MediaEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Abstract direction of a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Frames are flowing.
    Up,
    /// Frames are disrupted.
    Down,
}

impl Signal {
    /// Map a raw event to its direction.
    ///
    /// `VisibilityVisible` maps to nothing: it only counts as `Up` once the
    /// sink has been resumed, which the stream controller does.
    pub fn from_event(event: MediaEvent) -> Option<Signal> {
        match event {
            MediaEvent::PlayResolved | MediaEvent::Playing | MediaEvent::TrackUnmute => {
                Some(Signal::Up)
            }
            MediaEvent::Waiting
            | MediaEvent::Stalled
            | MediaEvent::Ended
            | MediaEvent::Error
            | MediaEvent::TrackMute
            | MediaEvent::TrackEnded
            | MediaEvent::VisibilityHidden
            | MediaEvent::DeviceChange => Some(Signal::Down),
            MediaEvent::VisibilityVisible => None,
        }
    }
}

/// Debounced judgement of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    /// Nothing has persisted long enough to be evaluated yet.
    #[default]
    Pending,
    Stable,
    Reconnecting,
}

/// Flattened view for UI binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StabilityState {
    pub stable_playing: bool,
    pub reconnecting: bool,
    pub on_timer_armed: bool,
    pub off_timer_armed: bool,
}

#[derive(Debug, Clone)]
pub struct StabilityDebouncer {
    on_delay: Duration,
    off_delay: Duration,
    stability: Stability,
    on_deadline: Option<Instant>,
    off_deadline: Option<Instant>,
}

impl Default for StabilityDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_DEBOUNCE)
    }
}

impl StabilityDebouncer {
    pub fn new(on_delay: Duration, off_delay: Duration) -> Self {
        Self {
            on_delay,
            off_delay,
            stability: Stability::Pending,
            on_deadline: None,
            off_deadline: None,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(
            Duration::from_millis(config.stable_delay_ms),
            Duration::from_millis(config.reconnect_delay_ms),
        )
    }

    /// Feed one raw signal observed at `now`.
    pub fn signal(&mut self, signal: Signal, now: Instant) {
        match signal {
            Signal::Up => {
                self.off_deadline = None;
                if self.on_deadline.is_none() {
                    self.on_deadline = Some(now + self.on_delay);
                }
            }
            Signal::Down => {
                self.on_deadline = None;
                if self.off_deadline.is_none() {
                    self.off_deadline = Some(now + self.off_delay);
                }
            }
        }
    }

    /// Apply any timer that expired at or before `now`.
    ///
    /// Returns the new stability when it changed.
    pub fn poll(&mut self, now: Instant) -> Option<Stability> {
        let before = self.stability;

        if self.on_deadline.is_some_and(|deadline| now >= deadline) {
            self.on_deadline = None;
            self.stability = Stability::Stable;
        }
        if self.off_deadline.is_some_and(|deadline| now >= deadline) {
            self.off_deadline = None;
            self.stability = Stability::Reconnecting;
        }

        let state = self.state();
        assert_invariant!(
            !(state.stable_playing && state.reconnecting),
            "stable and reconnecting are exclusive",
            "StabilityDebouncer::poll"
        );

        (self.stability != before).then_some(self.stability)
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.on_deadline, self.off_deadline) {
            (Some(on), Some(off)) => Some(on.min(off)),
            (on, off) => on.or(off),
        }
    }

    /// Cancel both timers and forget the judgement.
    pub fn reset(&mut self) {
        self.on_deadline = None;
        self.off_deadline = None;
        self.stability = Stability::Pending;
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }

    pub fn state(&self) -> StabilityState {
        StabilityState {
            stable_playing: self.stability == Stability::Stable,
            reconnecting: self.stability == Stability::Reconnecting,
            on_timer_armed: self.on_deadline.is_some(),
            off_timer_armed: self.off_deadline.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_up_becomes_stable_after_delay() {
        let t0 = Instant::now();
        let mut deb = StabilityDebouncer::default();

        deb.signal(Signal::Up, t0);
        assert!(deb.state().on_timer_armed);
        assert_eq!(deb.poll(t0 + ms(399)), None);
        assert_eq!(deb.stability(), Stability::Pending);
        assert_eq!(deb.poll(t0 + ms(400)), Some(Stability::Stable));
        assert!(!deb.state().on_timer_armed);
    }

    #[test]
    fn test_flicker_sequence_waits_for_last_up() {
        let t0 = Instant::now();
        let mut deb = StabilityDebouncer::default();

        deb.signal(Signal::Up, t0);
        deb.signal(Signal::Down, t0 + ms(100));
        deb.signal(Signal::Up, t0 + ms(150));

        assert_eq!(deb.poll(t0 + ms(400)), None);
        assert_eq!(deb.poll(t0 + ms(500)), None);
        assert_eq!(deb.poll(t0 + ms(549)), None);
        assert!(!deb.state().stable_playing);
        assert_eq!(deb.poll(t0 + ms(550)), Some(Stability::Stable));
    }

    #[test]
    fn test_repeated_signals_do_not_rearm() {
        let t0 = Instant::now();
        let mut deb = StabilityDebouncer::default();

        deb.signal(Signal::Down, t0);
        for step in 1..10 {
            deb.signal(Signal::Down, t0 + ms(step * 50));
        }
        assert_eq!(deb.next_deadline(), Some(t0 + ms(400)));
        assert_eq!(deb.poll(t0 + ms(400)), Some(Stability::Reconnecting));
        assert!(deb.state().reconnecting);
    }

    #[test]
    fn test_asymmetric_delays() {
        let t0 = Instant::now();
        let mut deb = StabilityDebouncer::new(ms(200), ms(800));

        deb.signal(Signal::Up, t0);
        assert_eq!(deb.poll(t0 + ms(200)), Some(Stability::Stable));
        deb.signal(Signal::Down, t0 + ms(300));
        assert_eq!(deb.poll(t0 + ms(1000)), None);
        assert_eq!(deb.poll(t0 + ms(1100)), Some(Stability::Reconnecting));
    }

    #[test]
    fn test_reset_cancels_timers() {
        let t0 = Instant::now();
        let mut deb = StabilityDebouncer::default();
        deb.signal(Signal::Up, t0);
        deb.poll(t0 + ms(400));
        deb.signal(Signal::Down, t0 + ms(500));

        deb.reset();
        assert_eq!(deb.state(), StabilityState::default());
        assert_eq!(deb.next_deadline(), None);
        assert_eq!(deb.poll(t0 + ms(5000)), None);
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(Signal::from_event(MediaEvent::PlayResolved), Some(Signal::Up));
        assert_eq!(Signal::from_event(MediaEvent::TrackUnmute), Some(Signal::Up));
        assert_eq!(Signal::from_event(MediaEvent::Stalled), Some(Signal::Down));
        assert_eq!(Signal::from_event(MediaEvent::DeviceChange), Some(Signal::Down));
        assert_eq!(Signal::from_event(MediaEvent::VisibilityHidden), Some(Signal::Down));
        assert_eq!(Signal::from_event(MediaEvent::VisibilityVisible), None);
    }
}
