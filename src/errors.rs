use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified camera condition surfaced to the caller.
///
/// Hardware failures never reach the coordinator as raw platform errors; the
/// stream controller converts every [`MediaError`] into one of these first.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum CameraError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Camera not found: {0}")]
    DeviceNotFound(String),
    #[error("Camera busy: {0}")]
    DeviceBusy(String),
    #[error("Camera unsupported: {0}")]
    Unsupported(String),
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    #[error("Constraint unsatisfiable: {0}")]
    ConstraintUnsatisfiable(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Where a retry re-enters the lifecycle after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryFrom {
    /// Restart from the permission prompt.
    Permission,
    /// Restart only the stream acquisition.
    Start,
    /// No retry path; guidance only.
    Never,
}

impl CameraError {
    /// Retry entry point for this error class.
    pub fn retry_from(&self) -> RetryFrom {
        match self {
            CameraError::PermissionDenied(_) | CameraError::DeviceNotFound(_) => {
                RetryFrom::Permission
            }
            CameraError::Unsupported(_) => RetryFrom::Never,
            CameraError::DeviceBusy(_)
            | CameraError::CaptureFailed(_)
            | CameraError::ConstraintUnsatisfiable(_)
            | CameraError::Stream(_)
            | CameraError::Config(_)
            | CameraError::InvalidState(_) => RetryFrom::Start,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_from() != RetryFrom::Never
    }

    /// Human readable guidance for the error banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => {
                "Camera access was denied. Allow camera access and try again."
            }
            CameraError::DeviceNotFound(_) => "No camera was found. Connect a camera and try again.",
            CameraError::DeviceBusy(_) => {
                "The camera is in use by another application. Close it and try again."
            }
            CameraError::Unsupported(_) => {
                "Camera access is not available here. Use a secure connection or a supported browser."
            }
            CameraError::CaptureFailed(_) => "The photo could not be taken. Try again.",
            CameraError::ConstraintUnsatisfiable(_) => {
                "The requested camera is not available. Try switching cameras."
            }
            CameraError::Stream(_) => "The camera could not be started. Try again.",
            CameraError::Config(_) => "The camera settings are invalid.",
            CameraError::InvalidState(_) => "The camera is busy. Try again in a moment.",
        }
    }
}

/// Raw failure reported by a hardware media backend.
///
/// `name` follows the DOMException names used by media APIs
/// (`NotAllowedError`, `NotFoundError`, `NotReadableError`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct MediaError {
    pub name: String,
    pub message: String,
}

impl MediaError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new("NotAllowedError", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFoundError", message)
    }

    pub fn not_readable(message: impl Into<String>) -> Self {
        Self::new("NotReadableError", message)
    }

    pub fn overconstrained(constraint: impl Into<String>) -> Self {
        Self::new("OverconstrainedError", constraint)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new("NotSupportedError", message)
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::new("AbortError", message)
    }

    pub fn is_overconstrained(&self) -> bool {
        matches!(
            self.name.as_str(),
            "OverconstrainedError" | "ConstraintNotSatisfiedError"
        )
    }

    /// Convert into the classified taxonomy.
    pub fn classify(&self) -> CameraError {
        let message = self.message.clone();
        match self.name.as_str() {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                CameraError::PermissionDenied(message)
            }
            "NotFoundError" | "DevicesNotFoundError" => CameraError::DeviceNotFound(message),
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                CameraError::DeviceBusy(message)
            }
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                CameraError::ConstraintUnsatisfiable(message)
            }
            "NotSupportedError" => CameraError::Unsupported(message),
            _ => CameraError::Stream(self.to_string()),
        }
    }
}

impl From<MediaError> for CameraError {
    fn from(error: MediaError) -> Self {
        error.classify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dom_names() {
        assert!(matches!(
            MediaError::not_allowed("x").classify(),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            MediaError::new("SecurityError", "x").classify(),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            MediaError::new("DevicesNotFoundError", "x").classify(),
            CameraError::DeviceNotFound(_)
        ));
        assert!(matches!(
            MediaError::new("TrackStartError", "x").classify(),
            CameraError::DeviceBusy(_)
        ));
        assert!(matches!(
            MediaError::overconstrained("deviceId").classify(),
            CameraError::ConstraintUnsatisfiable(_)
        ));
        assert!(matches!(
            MediaError::not_supported("x").classify(),
            CameraError::Unsupported(_)
        ));
    }

    #[test]
    fn test_unknown_name_is_stream_error() {
        let err = MediaError::new("TypeError", "empty constraints").classify();
        assert_eq!(
            err,
            CameraError::Stream("TypeError: empty constraints".to_string())
        );
    }

    #[test]
    fn test_retry_entry_points() {
        assert_eq!(
            CameraError::PermissionDenied(String::new()).retry_from(),
            RetryFrom::Permission
        );
        assert_eq!(
            CameraError::DeviceBusy(String::new()).retry_from(),
            RetryFrom::Start
        );
        assert!(!CameraError::Unsupported(String::new()).is_retryable());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&CameraError::DeviceBusy("in use".into())).unwrap();
        assert_eq!(json, r#"{"kind":"DeviceBusy","message":"in use"}"#);
    }
}
