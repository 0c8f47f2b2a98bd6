//! Still capture from a bound, stable sink
//!
//! The frame is rasterised at the sink's native resolution (never the display
//! size) and encoded to JPEG exactly once. The preview data URI and the upload
//! file are both views of that single encode.

use crate::config::CaptureConfig;
use crate::errors::CameraError;
use crate::platform::VideoSink;
use crate::types::{BinaryFile, CapturedImage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use uuid::Uuid;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct CaptureEngine {
    quality: u8,
    fallback_size: (u32, u32),
    file_name_prefix: String,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

impl CaptureEngine {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            quality: config.jpeg_quality.clamp(1, 100),
            fallback_size: (config.fallback_resolution[0], config.fallback_resolution[1]),
            file_name_prefix: config.file_name_prefix.clone(),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Grab the current frame of `sink` as a preview image plus an upload file.
    pub fn capture<S: VideoSink>(&self, sink: &S) -> Result<(CapturedImage, BinaryFile), CameraError> {
        if !sink.is_bound() {
            return Err(CameraError::CaptureFailed("video sink is not bound".to_string()));
        }

        let (width, height) = match sink.natural_size() {
            (0, _) | (_, 0) => {
                log::warn!(
                    "Sink reports no natural size, capturing at {}x{}",
                    self.fallback_size.0,
                    self.fallback_size.1
                );
                self.fallback_size
            }
            size => size,
        };

        let mut canvas = RgbImage::new(width, height);
        if !sink.draw_frame(&mut canvas) {
            return Err(CameraError::CaptureFailed("no frame available".to_string()));
        }

        let encoded = self.encode(&canvas)?;
        let captured_at = Utc::now();
        let data_uri = format!("data:{};base64,{}", JPEG_MIME, STANDARD.encode(&encoded));

        let image = CapturedImage {
            id: Uuid::new_v4(),
            encoded_data_uri: data_uri,
            blob: encoded.clone(),
            mime_type: JPEG_MIME.to_string(),
            width,
            height,
            captured_at,
        };
        let file = BinaryFile {
            name: format!(
                "{}-{}.jpg",
                self.file_name_prefix,
                captured_at.format("%Y%m%d-%H%M%S%3f")
            ),
            mime_type: JPEG_MIME.to_string(),
            bytes: encoded,
            last_modified: captured_at,
        };

        log::info!(
            "Captured {}x{} frame ({} bytes, quality {})",
            width,
            height,
            file.size(),
            self.quality
        );
        Ok((image, file))
    }

    fn encode(&self, canvas: &RgbImage) -> Result<Bytes, CameraError> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(canvas)
            .map_err(|e| CameraError::CaptureFailed(format!("JPEG encode failed: {}", e)))?;

        if buffer.is_empty() {
            return Err(CameraError::CaptureFailed("encoder produced no data".to_string()));
        }
        Ok(Bytes::from(buffer))
    }
}

/// Decode the payload of a `data:` URI produced by [`CaptureEngine::capture`].
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, CameraError> {
    let (_, payload) = uri
        .split_once(";base64,")
        .ok_or_else(|| CameraError::CaptureFailed("not a base64 data URI".to_string()))?;
    STANDARD
        .decode(payload)
        .map_err(|e| CameraError::CaptureFailed(format!("invalid base64 payload: {}", e)))
}
