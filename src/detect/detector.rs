use std::sync::Mutex;

use anyhow::anyhow;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::Detection;
use crate::error::{Error, Result};

/// Minimum confidence a detection must exceed to be reported.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Turns raw upload bytes into labelled detections.
///
/// The threshold is fixed at construction and shared by every call. No class
/// filtering happens here: every label the model knows is reported.
pub struct Detector {
    backend: Mutex<Box<dyn DetectorBackend>>,
    backend_name: &'static str,
    labels: LabelTable,
    confidence_threshold: f32,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B, labels: LabelTable) -> Self {
        Self::from_boxed(Box::new(backend), labels)
    }

    pub fn from_boxed(backend: Box<dyn DetectorBackend>, labels: LabelTable) -> Self {
        let backend_name = backend.name();
        Self {
            backend: Mutex::new(backend),
            backend_name,
            labels,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn warm_up(&self) -> Result<()> {
        let mut backend = self.lock_backend()?;
        backend.warm_up().map_err(Error::Inference)
    }

    /// Decode `image_bytes` and run the model on it.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<Vec<Detection>> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();
        let raw = {
            let mut backend = self.lock_backend()?;
            backend
                .infer(&image, self.confidence_threshold)
                .map_err(Error::Inference)?
        };

        Ok(raw
            .into_iter()
            .map(|d| Detection {
                class: self.labels.resolve(d.class_id),
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect())
    }

    fn lock_backend(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn DetectorBackend>>> {
        self.backend
            .lock()
            .map_err(|_| Error::Inference(anyhow!("detector backend lock poisoned")))
    }
}
