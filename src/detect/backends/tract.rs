#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{
    decode_yolo_head, non_max_suppression, HeadLayout, Letterbox, LETTERBOX_FILL,
};
use crate::detect::result::RawDetection;

/// IoU above which two same-class boxes are considered duplicates.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// This backend loads a local model file once and runs it on letterboxed RGB
/// images. It does not perform any network I/O or write to disk.
pub struct TractBackend {
    model: Plan,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for `input_size` square input.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    fn build_input(&self, image: &RgbImage, letterbox: &Letterbox) -> Tensor {
        let resized = imageops::resize(
            image,
            letterbox.resized_width,
            letterbox.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([LETTERBOX_FILL; 3]),
        );
        imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        letterbox: &Letterbox,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detection head shape {:?}", shape));
        }

        let layout = HeadLayout::infer(shape[1], shape[2]);
        let (channels, anchors) = match layout {
            HeadLayout::ChannelsFirst => (shape[1], shape[2]),
            HeadLayout::AnchorsFirst => (shape[2], shape[1]),
        };
        let data: Vec<f32> = view.iter().copied().collect();

        let candidates = decode_yolo_head(&data, channels, anchors, layout, confidence_threshold);
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);
        Ok(kept
            .into_iter()
            .map(|d| RawDetection {
                bbox: letterbox.to_source(d.bbox),
                ..d
            })
            .collect())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let letterbox = Letterbox::fit(image.width(), image.height(), self.input_size);
        let input = self.build_input(image, &letterbox);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, &letterbox, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([LETTERBOX_FILL; 3]),
        );
        self.infer(&blank, 1.0).map(|_| ())
    }
}
