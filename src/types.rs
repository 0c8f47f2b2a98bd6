use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical orientation of a camera, as guessed by the device catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    Back,
    #[default]
    Unknown,
}

/// Logical camera request resolved by the platform when no device id is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Front,
    Back,
}

impl FacingMode {
    pub fn opposite(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        }
    }

    /// Value of the `facingMode` constraint.
    pub fn as_constraint(&self) -> &'static str {
        match self {
            FacingMode::Front => "user",
            FacingMode::Back => "environment",
        }
    }

    pub fn from_facing(facing: Facing) -> Option<Self> {
        match facing {
            Facing::Front => Some(FacingMode::Front),
            Facing::Back => Some(FacingMode::Back),
            Facing::Unknown => None,
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Front => write!(f, "front"),
            FacingMode::Back => write!(f, "back"),
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "back" | "environment" => Ok(FacingMode::Back),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// A video input enumerated under the current permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
    pub facing: Facing,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            facing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Device entry as reported by the hardware media API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
    pub group_id: String,
}

impl DeviceDescriptor {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
            group_id: String::new(),
        }
    }
}

/// What to open: a specific device, a logical facing mode, or whatever camera
/// the platform hands out once every preference has been relaxed away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "lowercase")]
pub enum StreamSelector {
    /// `facing` is the catalog's guess, kept as the relaxation hint.
    Device { id: String, facing: Facing },
    Facing { mode: FacingMode },
    Any,
}

impl StreamSelector {
    pub fn device(device: &CameraDevice) -> Self {
        StreamSelector::Device {
            id: device.id.clone(),
            facing: device.facing,
        }
    }

    pub fn facing(mode: FacingMode) -> Self {
        StreamSelector::Facing { mode }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            StreamSelector::Device { id, .. } => Some(id),
            StreamSelector::Facing { .. } | StreamSelector::Any => None,
        }
    }

    /// Logical facing this selector resolves to, if known.
    pub fn facing_mode(&self) -> Option<FacingMode> {
        match self {
            StreamSelector::Device { facing, .. } => FacingMode::from_facing(*facing),
            StreamSelector::Facing { mode } => Some(*mode),
            StreamSelector::Any => None,
        }
    }
}

impl std::fmt::Display for StreamSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamSelector::Device { id, .. } => write!(f, "device {id}"),
            StreamSelector::Facing { mode } => write!(f, "{mode} camera"),
            StreamSelector::Any => write!(f, "any camera"),
        }
    }
}

/// Source part of a stream request. An exact id and a facing mode are never combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSource {
    ExactDevice(String),
    Facing(FacingMode),
    Any,
}

/// Constraint set handed to `MediaBackend::request_stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_frame_rate: u32,
    pub source: ConstraintSource,
    pub audio: bool,
}

impl Constraints {
    pub fn for_selector(selector: &StreamSelector, resolution: [u32; 2], max_frame_rate: u32) -> Self {
        let source = match selector {
            StreamSelector::Device { id, .. } => ConstraintSource::ExactDevice(id.clone()),
            StreamSelector::Facing { mode } => ConstraintSource::Facing(*mode),
            StreamSelector::Any => ConstraintSource::Any,
        };
        Self {
            ideal_width: resolution[0],
            ideal_height: resolution[1],
            max_frame_rate,
            source,
            audio: false,
        }
    }

    /// One step looser: exact id becomes facing-only, facing-only becomes any camera.
    ///
    /// Returns `None` once nothing is left to drop.
    pub fn relaxed(&self, fallback: FacingMode, hint: Option<FacingMode>) -> Option<Self> {
        let source = match &self.source {
            ConstraintSource::ExactDevice(_) => ConstraintSource::Facing(hint.unwrap_or(fallback)),
            ConstraintSource::Facing(_) => ConstraintSource::Any,
            ConstraintSource::Any => return None,
        };
        Some(Self {
            source,
            ..self.clone()
        })
    }
}

/// One still capture. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedImage {
    pub id: Uuid,
    /// `data:image/jpeg;base64,...` for immediate preview.
    pub encoded_data_uri: String,
    /// Encoded JPEG bytes; the same buffer as the paired [`BinaryFile`].
    #[serde(skip)]
    pub blob: Bytes,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// File-like upload artifact paired with a [`CapturedImage`].
#[derive(Debug, Clone)]
pub struct BinaryFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub last_modified: DateTime<Utc>,
}

impl BinaryFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_constraints_never_combine() {
        let device = StreamSelector::Device {
            id: "cam-1".into(),
            facing: Facing::Back,
        };
        let c = Constraints::for_selector(&device, [1280, 720], 30);
        assert_eq!(c.source, ConstraintSource::ExactDevice("cam-1".into()));
        assert!(!c.audio);

        let c = Constraints::for_selector(&StreamSelector::facing(FacingMode::Front), [640, 480], 15);
        assert_eq!(c.source, ConstraintSource::Facing(FacingMode::Front));
        assert_eq!(c.max_frame_rate, 15);
    }

    #[test]
    fn test_relaxation_chain() {
        let c = Constraints::for_selector(
            &StreamSelector::Device {
                id: "cam-1".into(),
                facing: Facing::Front,
            },
            [1280, 720],
            30,
        );
        let step1 = c.relaxed(FacingMode::Back, Some(FacingMode::Front)).unwrap();
        assert_eq!(step1.source, ConstraintSource::Facing(FacingMode::Front));
        let step2 = step1.relaxed(FacingMode::Back, None).unwrap();
        assert_eq!(step2.source, ConstraintSource::Any);
        assert!(step2.relaxed(FacingMode::Back, None).is_none());
    }

    #[test]
    fn test_any_selector_requests_any_camera() {
        let c = Constraints::for_selector(&StreamSelector::Any, [1280, 720], 30);
        assert_eq!(c.source, ConstraintSource::Any);
        assert!(c.relaxed(FacingMode::Back, None).is_none());
        assert_eq!(StreamSelector::Any.device_id(), None);
        assert_eq!(StreamSelector::Any.to_string(), "any camera");
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("environment".parse::<FacingMode>().unwrap(), FacingMode::Back);
        assert_eq!("Front".parse::<FacingMode>().unwrap(), FacingMode::Front);
        assert!("sideways".parse::<FacingMode>().is_err());
        assert_eq!(FacingMode::Back.as_constraint(), "environment");
    }
}
