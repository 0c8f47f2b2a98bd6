//! Configuration management for CrabSnap
//!
//! Provides loading, saving and validation of the caller-supplied settings:
//! preferred facing, ideal resolution and frame-rate cap, debounce delays and
//! JPEG quality.

use crate::errors::CameraError;
use crate::types::FacingMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `CRABSNAP__CAPTURE__JPEG_QUALITY=80`.
pub const ENV_PREFIX: &str = "CRABSNAP";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrabSnapConfig {
    pub stream: StreamConfig,
    pub stability: StabilityConfig,
    pub capture: CaptureConfig,
}

/// Stream acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Facing used for the first stream when devices allow a choice
    pub preferred_facing: FacingMode,
    /// Ideal capture resolution [width, height]
    pub ideal_resolution: [u32; 2],
    /// Frame-rate cap
    pub max_frame_rate: u32,
    /// Try the previous camera once when a switch fails
    pub revert_on_switch_failure: bool,
}

/// Debounce settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// How long frames must flow before the feed counts as stable
    pub stable_delay_ms: u64,
    /// How long a disruption must last before the feed counts as reconnecting
    pub reconnect_delay_ms: u64,
}

/// Still capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Raster size used when the sink reports no natural size [width, height]
    pub fallback_resolution: [u32; 2],
    /// File name prefix for the upload artifact
    pub file_name_prefix: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            preferred_facing: FacingMode::Back,
            ideal_resolution: [1280, 720],
            max_frame_rate: 30,
            revert_on_switch_failure: true,
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            stable_delay_ms: 400,
            reconnect_delay_ms: 400,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            fallback_resolution: [640, 480],
            file_name_prefix: "capture".to_string(),
        }
    }
}

impl Default for CrabSnapConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            stability: StabilityConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl CrabSnapConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: CrabSnapConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CameraError::Config)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the TOML file (if present) with `CRABSNAP__SECTION__KEY` environment overrides on top
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CameraError::Config(format!("Failed to build configuration: {}", e)))?;

        let config: CrabSnapConfig = settings
            .try_deserialize()
            .map_err(|e| CameraError::Config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate().map_err(CameraError::Config)?;
        log::debug!("Layered configuration resolved from {:?} and environment", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabsnap.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let [width, height] = self.stream.ideal_resolution;
        if width == 0 || height == 0 {
            return Err("Invalid ideal resolution".to_string());
        }
        if self.stream.max_frame_rate == 0 || self.stream.max_frame_rate > 240 {
            return Err("Invalid frame-rate cap (must be 1-240)".to_string());
        }

        if self.stability.stable_delay_ms == 0 || self.stability.reconnect_delay_ms == 0 {
            return Err("Debounce delays must be positive".to_string());
        }
        if self.stability.stable_delay_ms > 10_000 || self.stability.reconnect_delay_ms > 10_000 {
            return Err("Debounce delays must be at most 10000 ms".to_string());
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        let [fw, fh] = self.capture.fallback_resolution;
        if fw == 0 || fh == 0 {
            return Err("Invalid fallback resolution".to_string());
        }
        if self.capture.file_name_prefix.trim().is_empty() {
            return Err("File name prefix must not be empty".to_string());
        }

        Ok(())
    }
}
