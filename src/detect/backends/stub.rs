use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Stub backend for testing. Replays a fixed set of detections for every
/// image, applying the confidence threshold like a real model would.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<RawDetection>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence > confidence_threshold)
            .copied()
            .collect())
    }
}
