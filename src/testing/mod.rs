//! Testing utilities for CrabSnap
//!
//! An in-memory media backend that can be scripted per test, plus synthetic
//! frames and device lists, so the lifecycle can be exercised without hardware.

pub mod fake_backend;
pub mod synthetic_data;

pub use fake_backend::{FakeBackend, FakeSink, FakeStream};
pub use synthetic_data::{laptop_devices, phone_devices, synthetic_frame};
