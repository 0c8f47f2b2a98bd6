//! Property-Based Tests for the stability debouncer
//!
//! These tests verify the debouncing contract over arbitrary signal timelines
//! using proptest for input generation and shrinking.
//!
//! Run with: cargo test --test debouncer_props

use crabsnap::stability::{Signal, Stability, StabilityDebouncer};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

const ON: Duration = Duration::from_millis(400);
const OFF: Duration = Duration::from_millis(400);

fn signal_strategy() -> impl Strategy<Value = Signal> {
    prop_oneof![Just(Signal::Up), Just(Signal::Down)]
}

/// Feed `(gap_ms, signal)` pairs, polling at every signal time.
fn replay(debouncer: &mut StabilityDebouncer, base: Instant, timeline: &[(u64, Signal)]) -> (Instant, Vec<Stability>) {
    let mut now = base;
    let mut transitions = Vec::new();
    for (gap, signal) in timeline {
        now += Duration::from_millis(*gap);
        if let Some(changed) = debouncer.poll(now) {
            transitions.push(changed);
        }
        debouncer.signal(*signal, now);
    }
    (now, transitions)
}

// ═══════════════════════════════════════════════════════════════════════════
// DEBOUNCER INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: stable and reconnecting are never both set
    #[test]
    fn stable_and_reconnecting_are_exclusive(
        timeline in prop::collection::vec((0u64..1000, signal_strategy()), 0..60),
    ) {
        let mut debouncer = StabilityDebouncer::new(ON, OFF);
        let mut now = Instant::now();
        for (gap, signal) in &timeline {
            now += Duration::from_millis(*gap);
            debouncer.poll(now);
            let state = debouncer.state();
            prop_assert!(!(state.stable_playing && state.reconnecting));
            debouncer.signal(*signal, now);
        }
    }

    /// INVARIANT: once everything settles, the last direction wins
    #[test]
    fn last_direction_wins_after_settling(
        timeline in prop::collection::vec((0u64..1000, signal_strategy()), 1..60),
    ) {
        let mut debouncer = StabilityDebouncer::new(ON, OFF);
        let (end, _) = replay(&mut debouncer, Instant::now(), &timeline);

        debouncer.poll(end + ON.max(OFF));
        let expected = match timeline.last().map(|(_, s)| *s) {
            Some(Signal::Up) => Stability::Stable,
            _ => Stability::Reconnecting,
        };
        prop_assert_eq!(debouncer.stability(), expected);
        prop_assert!(debouncer.next_deadline().is_none());
    }

    /// INVARIANT: disruptions shorter than the off delay never report reconnecting
    #[test]
    fn short_disruptions_are_absorbed(
        blips in prop::collection::vec((1u64..399, 0u64..2000), 1..30),
    ) {
        let mut debouncer = StabilityDebouncer::new(ON, OFF);
        let base = Instant::now();
        debouncer.signal(Signal::Up, base);
        let mut now = base + ON;
        prop_assert_eq!(debouncer.poll(now), Some(Stability::Stable));

        for (down_for, up_for) in blips {
            debouncer.signal(Signal::Down, now);
            now += Duration::from_millis(down_for);
            prop_assert_ne!(debouncer.poll(now), Some(Stability::Reconnecting));
            debouncer.signal(Signal::Up, now);
            now += Duration::from_millis(up_for);
            prop_assert_ne!(debouncer.poll(now), Some(Stability::Reconnecting));
        }
        prop_assert_eq!(debouncer.stability(), Stability::Stable);
    }

    /// INVARIANT: an up signal must persist for the full on delay
    #[test]
    fn stable_never_before_on_delay(
        early in 0u64..400,
    ) {
        let mut debouncer = StabilityDebouncer::new(ON, OFF);
        let base = Instant::now();
        debouncer.signal(Signal::Up, base);
        prop_assert_eq!(debouncer.poll(base + Duration::from_millis(early)), None);
        prop_assert_eq!(debouncer.poll(base + ON), Some(Stability::Stable));
    }

    /// INVARIANT: reset forgets timers and judgement
    #[test]
    fn reset_clears_everything(
        timeline in prop::collection::vec((0u64..1000, signal_strategy()), 0..30),
    ) {
        let mut debouncer = StabilityDebouncer::new(ON, OFF);
        let (end, _) = replay(&mut debouncer, Instant::now(), &timeline);

        debouncer.reset();
        prop_assert_eq!(debouncer.stability(), Stability::Pending);
        prop_assert!(debouncer.next_deadline().is_none());
        prop_assert_eq!(debouncer.poll(end + Duration::from_secs(10)), None);
    }
}

#[test]
fn flicker_timeline_settles_after_last_up() {
    // Up@0, Down@100, Up@150: stable at 550, not at 400.
    let mut debouncer = StabilityDebouncer::new(ON, OFF);
    let base = Instant::now();
    let (_, transitions) = replay(
        &mut debouncer,
        base,
        &[(0, Signal::Up), (100, Signal::Down), (50, Signal::Up)],
    );
    assert!(transitions.is_empty());

    assert_eq!(debouncer.poll(base + Duration::from_millis(400)), None);
    assert_eq!(debouncer.poll(base + Duration::from_millis(549)), None);
    assert_eq!(
        debouncer.poll(base + Duration::from_millis(550)),
        Some(Stability::Stable)
    );
}
