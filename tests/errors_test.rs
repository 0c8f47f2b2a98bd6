#[cfg(test)]
mod error_tests {
    use crabsnap::errors::{CameraError, MediaError, RetryFrom};
    use std::error::Error;

    fn all_variants(message: &str) -> Vec<CameraError> {
        vec![
            CameraError::PermissionDenied(message.to_string()),
            CameraError::DeviceNotFound(message.to_string()),
            CameraError::DeviceBusy(message.to_string()),
            CameraError::Unsupported(message.to_string()),
            CameraError::CaptureFailed(message.to_string()),
            CameraError::ConstraintUnsatisfiable(message.to_string()),
            CameraError::Stream(message.to_string()),
            CameraError::Config(message.to_string()),
            CameraError::InvalidState(message.to_string()),
        ]
    }

    #[test]
    fn test_camera_error_permission_denied() {
        let error = CameraError::PermissionDenied("Access denied".to_string());
        assert_eq!(error.to_string(), "Permission denied: Access denied");
    }

    #[test]
    fn test_camera_error_busy() {
        let error = CameraError::DeviceBusy("held by another app".to_string());
        assert!(error.to_string().contains("Camera busy"));
        assert!(error.to_string().contains("held by another app"));
    }

    #[test]
    fn test_camera_error_implements_error_trait() {
        let error = CameraError::CaptureFailed("Error trait test".to_string());
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_all_error_variants_display() {
        for error in all_variants("test") {
            let display = error.to_string();
            assert!(display.contains("test"), "message missing from {}", display);
            assert!(!error.user_message().is_empty());
            assert!(!format!("{:?}", error).is_empty());
        }
    }

    #[test]
    fn test_only_unsupported_is_final() {
        for error in all_variants("x") {
            let expect_final = matches!(error, CameraError::Unsupported(_));
            assert_eq!(!error.is_retryable(), expect_final, "{:?}", error);
        }
    }

    #[test]
    fn test_missing_device_restarts_from_permission() {
        assert_eq!(
            CameraError::DeviceNotFound(String::new()).retry_from(),
            RetryFrom::Permission
        );
        assert_eq!(
            CameraError::ConstraintUnsatisfiable(String::new()).retry_from(),
            RetryFrom::Start
        );
    }

    #[test]
    fn test_media_error_conversion() {
        let error: CameraError = MediaError::not_found("no camera").into();
        assert_eq!(error, CameraError::DeviceNotFound("no camera".to_string()));

        let error: CameraError = MediaError::abort("hardware hiccup").into();
        assert!(matches!(error, CameraError::DeviceBusy(_)));
    }

    #[test]
    fn test_media_error_display() {
        let error = MediaError::overconstrained("deviceId");
        assert_eq!(error.to_string(), "OverconstrainedError: deviceId");
        assert!(error.is_overconstrained());
        assert!(!MediaError::not_allowed("x").is_overconstrained());
    }

    #[test]
    fn test_error_round_trips_through_json() {
        for error in all_variants("payload") {
            let json = serde_json::to_string(&error).unwrap();
            let back: CameraError = serde_json::from_str(&json).unwrap();
            assert_eq!(back, error);
        }
    }

    #[test]
    fn test_error_long_message() {
        let long_message = "A".repeat(1000);
        for error in all_variants(&long_message) {
            assert!(error.to_string().contains(&long_message));
        }
    }
}
