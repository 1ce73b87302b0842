//! Geometry shared by YOLO-style backends: letterbox mapping, output decoding
//! and non-maximum suppression.

use std::cmp::Ordering;

use crate::detect::result::RawDetection;

/// Grey used by YOLO preprocessing for letterbox padding.
pub const LETTERBOX_FILL: u8 = 114;

/// Scale and padding applied when fitting an image into a square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    source_width: u32,
    source_height: u32,
}

impl Letterbox {
    pub fn fit(source_width: u32, source_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / source_width.max(1) as f32)
            .min(input_size as f32 / source_height.max(1) as f32);
        let resized_width = ((source_width as f32 * scale).round() as u32).clamp(1, input_size);
        let resized_height = ((source_height as f32 * scale).round() as u32).clamp(1, input_size);
        let pad_x = (input_size - resized_width) as f32 / 2.0;
        let pad_y = (input_size - resized_height) as f32 / 2.0;
        Self {
            scale,
            pad_x: pad_x.floor(),
            pad_y: pad_y.floor(),
            resized_width,
            resized_height,
            source_width,
            source_height,
        }
    }

    /// Map a model-space `[x1, y1, x2, y2]` box back onto the source image.
    pub fn to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, max_y),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, max_y),
        ]
    }
}

/// Layout of a YOLOv8 detection head output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadLayout {
    /// `[1, 4 + classes, anchors]`, the stock export.
    ChannelsFirst,
    /// `[1, anchors, 4 + classes]`
    AnchorsFirst,
}

impl HeadLayout {
    /// Guess the layout from the two trailing dimensions. Anchors always
    /// outnumber channels for real models.
    pub fn infer(dim1: usize, dim2: usize) -> Self {
        if dim1 <= dim2 {
            HeadLayout::ChannelsFirst
        } else {
            HeadLayout::AnchorsFirst
        }
    }
}

/// Decode a flat YOLOv8 head into candidate boxes in model-input space.
///
/// Each anchor keeps only its best class; anchors whose best score does not
/// exceed `confidence_threshold` are dropped.
pub fn decode_yolo_head(
    data: &[f32],
    channels: usize,
    anchors: usize,
    layout: HeadLayout,
    confidence_threshold: f32,
) -> Vec<RawDetection> {
    if channels <= 4 || data.len() < channels * anchors {
        return Vec::new();
    }
    let at = |channel: usize, anchor: usize| match layout {
        HeadLayout::ChannelsFirst => data[channel * anchors + anchor],
        HeadLayout::AnchorsFirst => data[anchor * channels + channel],
    };

    let mut out = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for channel in 4..channels {
            let score = at(channel, anchor);
            if score > best_score {
                best_score = score;
                best_class = channel - 4;
            }
        }
        if best_score <= confidence_threshold {
            continue;
        }

        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);
        out.push(RawDetection {
            class_id: best_class,
            confidence: best_score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }
    out
}

/// Class-aware greedy non-maximum suppression.
///
/// Returns at most `max_detections` boxes ordered by descending confidence.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
