//! Video input enumeration and front/back classification
//!
//! Facing is guessed from device labels. Operating systems do not
//! standardise those labels, so the classification is best-effort: an
//! external USB camera labelled "HD Webcam" is simply the second device and
//! becomes `Back`. Callers must treat [`Facing`] as a hint, never as truth.

use crate::platform::MediaBackend;
use crate::types::{CameraDevice, DeviceKind, Facing, FacingMode, StreamSelector};

const FRONT_KEYWORDS: &[&str] = &["front", "user", "selfie", "facetime", "internal"];
const BACK_KEYWORDS: &[&str] = &["back", "rear", "environment", "main", "primary"];

pub struct DeviceCatalog;

impl DeviceCatalog {
    /// List the video inputs visible to the current permission grant.
    ///
    /// Never fails: enumeration errors are logged and produce an empty list,
    /// in which case callers fall back to facing-mode requests.
    pub async fn enumerate<B: MediaBackend>(backend: &B) -> Vec<CameraDevice> {
        let descriptors = match backend.enumerate_devices().await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                log::warn!("Device enumeration failed, using facing mode only: {}", e);
                return Vec::new();
            }
        };

        let devices: Vec<CameraDevice> = descriptors
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput && !d.device_id.is_empty())
            .enumerate()
            .map(|(position, d)| {
                let facing = Self::classify(&d.label, position);
                CameraDevice::new(d.device_id, d.label, facing)
            })
            .collect();

        log::info!("Enumerated {} video input(s)", devices.len());
        for device in &devices {
            log::debug!("  {} {:?} ({:?})", device.id, device.label, device.facing);
        }
        devices
    }

    /// Guess the facing of the device at `position` from its label.
    pub fn classify(label: &str, position: usize) -> Facing {
        let label = label.to_lowercase();
        if FRONT_KEYWORDS.iter().any(|k| label.contains(k)) {
            Facing::Front
        } else if BACK_KEYWORDS.iter().any(|k| label.contains(k)) {
            Facing::Back
        } else if position == 0 {
            Facing::Front
        } else {
            Facing::Back
        }
    }

    /// First back camera, else the first camera, else `None` (facing mode only).
    pub fn pick_default(devices: &[CameraDevice]) -> Option<&CameraDevice> {
        Self::pick_preferred(devices, FacingMode::Back)
    }

    /// Same policy as [`DeviceCatalog::pick_default`] for any preferred facing.
    pub fn pick_preferred(devices: &[CameraDevice], preferred: FacingMode) -> Option<&CameraDevice> {
        let wanted = match preferred {
            FacingMode::Front => Facing::Front,
            FacingMode::Back => Facing::Back,
        };
        devices
            .iter()
            .find(|d| d.facing == wanted)
            .or_else(|| devices.first())
    }

    /// Selector for the initial stream.
    pub fn initial_selector(devices: &[CameraDevice], preferred: FacingMode) -> StreamSelector {
        Self::pick_preferred(devices, preferred)
            .map(StreamSelector::device)
            .unwrap_or_else(|| StreamSelector::facing(preferred))
    }

    /// Selector a camera switch moves to from `current`.
    ///
    /// With two or more devices: the first device after the current one whose
    /// facing differs, else simply the next device. With fewer devices there
    /// is nothing to cycle through, so the logical facing flips instead.
    pub fn next_candidate(
        devices: &[CameraDevice],
        current: &StreamSelector,
        fallback: FacingMode,
    ) -> StreamSelector {
        let current_mode = current.facing_mode().unwrap_or(fallback);

        if devices.len() < 2 {
            return StreamSelector::facing(current_mode.opposite());
        }

        let current_index = current
            .device_id()
            .and_then(|id| devices.iter().position(|d| d.id == id));

        let Some(index) = current_index else {
            // Facing-mode stream or a device that vanished: jump to the other side.
            let wanted = current_mode.opposite();
            return Self::pick_preferred(devices, wanted)
                .map(StreamSelector::device)
                .unwrap_or_else(|| StreamSelector::facing(wanted));
        };

        let current_facing = devices[index].facing;
        let count = devices.len();
        let rotation = || (1..count).map(move |step| &devices[(index + step) % count]);

        rotation()
            .find(|d| d.facing != current_facing)
            .or_else(|| rotation().next())
            .map(StreamSelector::device)
            .unwrap_or_else(|| StreamSelector::facing(current_mode.opposite()))
    }

    pub fn contains(devices: &[CameraDevice], id: &str) -> bool {
        devices.iter().any(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, label: &str, facing: Facing) -> CameraDevice {
        CameraDevice::new(id, label, facing)
    }

    #[test]
    fn test_classify_keywords() {
        assert_eq!(DeviceCatalog::classify("Front Camera", 3), Facing::Front);
        assert_eq!(DeviceCatalog::classify("FaceTime HD Camera", 1), Facing::Front);
        assert_eq!(DeviceCatalog::classify("camera2 1, facing back", 0), Facing::Back);
        assert_eq!(DeviceCatalog::classify("Rear Wide", 0), Facing::Back);
        assert_eq!(DeviceCatalog::classify("environment", 0), Facing::Back);
    }

    #[test]
    fn test_classify_position_fallback() {
        assert_eq!(DeviceCatalog::classify("HD Webcam C920", 0), Facing::Front);
        assert_eq!(DeviceCatalog::classify("HD Webcam C920", 1), Facing::Back);
        assert_eq!(DeviceCatalog::classify("", 2), Facing::Back);
    }

    #[test]
    fn test_pick_default_prefers_back() {
        let devices = vec![
            device("a", "Front", Facing::Front),
            device("b", "Back", Facing::Back),
        ];
        assert_eq!(DeviceCatalog::pick_default(&devices).unwrap().id, "b");

        let fronts = vec![device("a", "Front", Facing::Front)];
        assert_eq!(DeviceCatalog::pick_default(&fronts).unwrap().id, "a");

        assert!(DeviceCatalog::pick_default(&[]).is_none());
    }

    #[test]
    fn test_initial_selector_without_devices_uses_facing() {
        assert_eq!(
            DeviceCatalog::initial_selector(&[], FacingMode::Front),
            StreamSelector::facing(FacingMode::Front)
        );
    }

    #[test]
    fn test_next_candidate_prefers_opposite_facing() {
        let devices = vec![
            device("f", "Front", Facing::Front),
            device("b1", "Back Wide", Facing::Back),
            device("b2", "Back Tele", Facing::Back),
        ];
        let current = StreamSelector::device(&devices[1]);
        assert_eq!(
            DeviceCatalog::next_candidate(&devices, &current, FacingMode::Back),
            StreamSelector::device(&devices[0])
        );

        let current = StreamSelector::device(&devices[0]);
        assert_eq!(
            DeviceCatalog::next_candidate(&devices, &current, FacingMode::Back),
            StreamSelector::device(&devices[1])
        );
    }

    #[test]
    fn test_next_candidate_cycles_same_facing() {
        let devices = vec![
            device("b1", "Back Wide", Facing::Back),
            device("b2", "Back Tele", Facing::Back),
        ];
        let current = StreamSelector::device(&devices[1]);
        assert_eq!(
            DeviceCatalog::next_candidate(&devices, &current, FacingMode::Back),
            StreamSelector::device(&devices[0])
        );
    }

    #[test]
    fn test_next_candidate_single_device_flips_facing() {
        let devices = vec![device("only", "Integrated", Facing::Front)];
        let current = StreamSelector::device(&devices[0]);
        assert_eq!(
            DeviceCatalog::next_candidate(&devices, &current, FacingMode::Back),
            StreamSelector::facing(FacingMode::Back)
        );
        assert_eq!(
            DeviceCatalog::next_candidate(&[], &StreamSelector::facing(FacingMode::Back), FacingMode::Back),
            StreamSelector::facing(FacingMode::Front)
        );
    }
}
