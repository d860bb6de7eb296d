//! CaptureController - Camera Stream and Still Capture
//!
//! ## Responsibilities
//!
//! - Acquire an environment-facing camera stream through a `CameraBackend`
//! - Release the stream (idempotent)
//! - Rasterize the current preview frame into a JPEG payload
//!
//! Queue insertion is the caller's job; capture only produces the payload.

use crate::error::{CameraFault, Error, Result};
use crate::image_queue::ImagePayload;
use async_trait::async_trait;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// JPEG quality for captured stills (0-100)
pub const CAPTURE_JPEG_QUALITY: u8 = 90;

/// Source of camera streams (platform integration point)
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request the rear (environment-facing) video stream; denial or missing
    /// hardware is a fault
    async fn open(&self) -> std::result::Result<Box<dyn CameraStream>, CameraFault>;
}

/// Live camera stream bound to a preview surface
#[async_trait]
pub trait CameraStream: Send {
    /// Begin playback on the preview surface
    async fn play(&mut self) -> std::result::Result<(), CameraFault>;

    /// Current preview frame, if one has been decoded
    fn current_frame(&self) -> Option<DynamicImage>;

    /// Release all tracks
    fn stop(&mut self);
}

/// Backend for hosts without a camera; every open fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraBackend for NoCamera {
    async fn open(&self) -> std::result::Result<Box<dyn CameraStream>, CameraFault> {
        Err("no camera device available".into())
    }
}

/// Camera handle owner
pub struct CaptureController {
    backend: Box<dyn CameraBackend>,
    stream: Option<Box<dyn CameraStream>>,
}

impl CaptureController {
    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            stream: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Open and play the camera stream
    ///
    /// No-op if already started. On failure the handle stays empty.
    pub async fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut stream = self
            .backend
            .open()
            .await
            .map_err(Error::CameraUnavailable)?;

        if let Err(e) = stream.play().await {
            stream.stop();
            return Err(Error::CameraUnavailable(e));
        }

        tracing::info!(facing = "environment", "Camera started");
        self.stream = Some(stream);
        Ok(())
    }

    /// Release the stream; no-op when not started
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::info!("Camera stopped");
        }
    }

    /// Snapshot of the current preview frame
    pub fn frame(&self) -> Result<DynamicImage> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::Capture("camera not started".to_string()))?;

        let frame = stream
            .current_frame()
            .ok_or_else(|| Error::Capture("no preview frame available".to_string()))?;

        if frame.width() == 0 || frame.height() == 0 {
            return Err(Error::Capture("preview frame has zero size".to_string()));
        }
        Ok(frame)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode a preview frame as a JPEG still on the blocking pool
pub async fn encode_still(frame: DynamicImage) -> Result<ImagePayload> {
    let (width, height) = (frame.width(), frame.height());
    let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&frame))
        .await
        .map_err(|e| Error::Capture(format!("encode task failed: {}", e)))??;
    let payload = ImagePayload::jpeg_capture(bytes, Utc::now());

    tracing::debug!(
        file_name = %payload.file_name,
        bytes = payload.len(),
        width = width,
        height = height,
        "Frame captured"
    );

    Ok(payload)
}

fn encode_jpeg(frame: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = frame.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, CAPTURE_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| Error::Capture(format!("JPEG encoding failed: {}", e)))?;
    Ok(bytes)
}
