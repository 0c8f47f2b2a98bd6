//! CrabSnap: camera stream lifecycle manager for photo capture
//!
//! Drives a camera from permission prompt to a single still image: device
//! enumeration and front/back classification, stream acquisition with
//! constraint relaxation, debounced stream-stability tracking, and a
//! one-shot JPEG capture delivered as both a preview data URI and an upload
//! file.
//!
//! # Features
//! - At most one live hardware stream, with every listener released on close
//! - Camera switching through a clean stop/start pair
//! - Classified, retryable errors for permission, busy and missing devices
//! - Capture gated on a feed that has been playing steadily for a while
//! - A nokhwa-backed native backend and a scriptable in-memory backend
//!
//! # Usage
//! ```rust,no_run
//! use crabsnap::{LifecycleCoordinator, NativeBackend};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), crabsnap::CameraError> {
//! let mut camera = LifecycleCoordinator::with_defaults(NativeBackend::new());
//! camera.on_capture(|image, _file| {
//!     if let Some(image) = image {
//!         println!("captured {}x{}", image.width, image.height);
//!     }
//! });
//! camera.open().await?;
//! camera.wait_for_stable(Duration::from_secs(5)).await?;
//! camera.capture()?;
//! # Ok(())
//! # }
//! ```
pub mod capture;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod invariant_ppt;
pub mod platform;
pub mod stability;
pub mod stream;
pub mod types;

// Testing utilities - scriptable backend and synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::CaptureEngine;
pub use catalog::DeviceCatalog;
pub use config::CrabSnapConfig;
pub use coordinator::{LifecycleCoordinator, LifecycleState};
pub use errors::{CameraError, MediaError, RetryFrom};
pub use platform::{MediaBackend, MediaEvent, MediaStream, NativeBackend, VideoSink};
pub use stability::{Stability, StabilityDebouncer};
pub use stream::StreamController;
pub use types::{
    BinaryFile, CameraDevice, CapturedImage, Constraints, Facing, FacingMode, StreamSelector,
};

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabsnap=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
