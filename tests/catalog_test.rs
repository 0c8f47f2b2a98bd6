#[cfg(test)]
mod catalog_tests {
    use crabsnap::testing::{laptop_devices, phone_devices, FakeBackend};
    use crabsnap::types::{DeviceDescriptor, DeviceKind};
    use crabsnap::{DeviceCatalog, Facing, FacingMode, MediaError, StreamSelector};

    #[tokio::test]
    async fn test_enumerate_classifies_phone() {
        let backend = FakeBackend::new().with_devices(phone_devices());
        let devices = DeviceCatalog::enumerate(&backend).await;

        let facings: Vec<Facing> = devices.iter().map(|d| d.facing).collect();
        assert_eq!(facings, vec![Facing::Front, Facing::Back, Facing::Back]);
        assert_eq!(DeviceCatalog::pick_default(&devices).unwrap().id, "back-0");
    }

    #[tokio::test]
    async fn test_enumerate_skips_audio_and_anonymous_entries() {
        let mut descriptors = laptop_devices();
        descriptors.push(DeviceDescriptor {
            kind: DeviceKind::AudioInput,
            ..DeviceDescriptor::video("mic", "Microphone")
        });
        // Pre-permission entries come back without ids.
        descriptors.push(DeviceDescriptor::video("", ""));
        let backend = FakeBackend::new().with_devices(descriptors);

        let devices = DeviceCatalog::enumerate(&backend).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "integrated");
        // A lone unlabeled webcam is position 0, so it counts as front.
        assert_eq!(devices[0].facing, Facing::Front);
    }

    #[test]
    fn test_enumerate_outside_a_runtime() {
        let backend = FakeBackend::new().with_devices(phone_devices());
        let devices = tokio_test::block_on(DeviceCatalog::enumerate(&backend));
        assert_eq!(devices.len(), 3);
    }

    #[tokio::test]
    async fn test_enumerate_failure_is_empty() {
        let backend = FakeBackend::new();
        backend.fail_enumeration(MediaError::abort("boom"));
        assert!(DeviceCatalog::enumerate(&backend).await.is_empty());
    }

    #[tokio::test]
    async fn test_laptop_switch_flips_facing_mode() {
        let backend = FakeBackend::new().with_devices(laptop_devices());
        let devices = DeviceCatalog::enumerate(&backend).await;

        let initial = DeviceCatalog::initial_selector(&devices, FacingMode::Back);
        assert_eq!(initial, StreamSelector::device(&devices[0]));

        let next = DeviceCatalog::next_candidate(&devices, &initial, FacingMode::Back);
        assert_eq!(next, StreamSelector::facing(FacingMode::Back));
    }

    #[tokio::test]
    async fn test_repeated_switching_visits_both_sides() {
        let backend = FakeBackend::new().with_devices(phone_devices());
        let devices = DeviceCatalog::enumerate(&backend).await;

        let mut current = DeviceCatalog::initial_selector(&devices, FacingMode::Back);
        let mut seen = Vec::new();
        for _ in 0..4 {
            current = DeviceCatalog::next_candidate(&devices, &current, FacingMode::Back);
            seen.push(current.device_id().unwrap().to_string());
        }
        assert_eq!(seen, vec!["front-0", "back-0", "front-0", "back-0"]);
    }

    #[test]
    fn test_vanished_device_jumps_to_other_side() {
        let devices = vec![
            crabsnap::CameraDevice::new("f", "Front", Facing::Front),
            crabsnap::CameraDevice::new("b", "Back", Facing::Back),
        ];
        let gone = StreamSelector::Device {
            id: "unplugged".into(),
            facing: Facing::Back,
        };
        assert_eq!(
            DeviceCatalog::next_candidate(&devices, &gone, FacingMode::Back),
            StreamSelector::device(&devices[0])
        );
        assert!(!DeviceCatalog::contains(&devices, "unplugged"));
        assert!(DeviceCatalog::contains(&devices, "b"));
    }
}
