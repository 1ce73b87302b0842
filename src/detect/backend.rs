use anyhow::Result;
use image::RgbImage;

use crate::detect::result::RawDetection;

/// Object-detection model backend.
///
/// Backends see a decoded RGB image and return boxes in that image's pixel
/// coordinates. Label resolution happens in [`crate::detect::Detector`].
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on one image.
    ///
    /// Detections whose confidence does not exceed `confidence_threshold`
    /// must not be returned.
    fn infer(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
