//! Synthetic frames and device lists
//!
//! Shaped after real hardware: a phone exposing front, wide and tele cameras,
//! and a laptop with one integrated webcam whose label says nothing about
//! where it points.

use crate::types::DeviceDescriptor;
use image::{Rgb, RgbImage};

/// Gradient frame that changes with `frame_number`.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

/// Enumeration result of a typical three-camera phone.
pub fn phone_devices() -> Vec<DeviceDescriptor> {
    vec![
        DeviceDescriptor::video("front-0", "camera2 1, facing front"),
        DeviceDescriptor::video("back-0", "camera2 0, facing back"),
        DeviceDescriptor::video("back-2", "camera2 2, facing back"),
    ]
}

/// Enumeration result of a laptop with a single unlabeled webcam.
pub fn laptop_devices() -> Vec<DeviceDescriptor> {
    vec![DeviceDescriptor::video("integrated", "Integrated Webcam")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceKind;

    #[test]
    fn test_synthetic_frame_correct_size() {
        let frame = synthetic_frame(0, 320, 240);
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.as_raw().len(), 320 * 240 * 3);
    }

    #[test]
    fn test_synthetic_frames_differ() {
        let frame0 = synthetic_frame(0, 64, 48);
        let frame1 = synthetic_frame(1, 64, 48);
        assert_ne!(frame0.get_pixel(0, 0), frame1.get_pixel(0, 0));
    }

    #[test]
    fn test_device_lists_are_video_inputs() {
        assert!(phone_devices()
            .iter()
            .chain(laptop_devices().iter())
            .all(|d| d.kind == DeviceKind::VideoInput && !d.device_id.is_empty()));
    }
}
