use serde::{Deserialize, Serialize};

/// One labelled object found in a submitted photo.
///
/// Serialized as `{"class": .., "confidence": .., "box": [x1, y1, x2, y2]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    /// Corner coordinates in source-image pixels.
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

/// Backend output before label resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
}

impl RawDetection {
    pub fn area(&self) -> f32 {
        let [x1, y1, x2, y2] = self.bbox;
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    pub fn intersection_area(&self, other: &RawDetection) -> f32 {
        let x1 = self.bbox[0].max(other.bbox[0]);
        let y1 = self.bbox[1].max(other.bbox[1]);
        let x2 = self.bbox[2].min(other.bbox[2]);
        let y2 = self.bbox[3].min(other.bbox[3]);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &RawDetection) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Highest confidence among `detections`, or `None` when empty.
pub fn max_confidence(detections: &[Detection]) -> Option<f32> {
    detections
        .iter()
        .map(|d| d.confidence)
        .fold(None, |best, c| match best {
            Some(b) if b >= c => Some(b),
            _ => Some(c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_id: 0,
            confidence: 0.9,
            bbox,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = raw([0.0, 0.0, 10.0, 10.0]);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = raw([0.0, 0.0, 10.0, 10.0]);
        let b = raw([20.0, 20.0, 30.0, 30.0]);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = raw([0.0, 0.0, 10.0, 10.0]);
        let b = raw([5.0, 0.0, 15.0, 10.0]);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn max_confidence_picks_highest() {
        let dets = vec![
            Detection {
                class: "bottle".into(),
                confidence: 0.7,
                bbox: [0.0; 4],
            },
            Detection {
                class: "cup".into(),
                confidence: 0.9,
                bbox: [0.0; 4],
            },
        ];
        assert_eq!(max_confidence(&dets), Some(0.9));
        assert_eq!(max_confidence(&[]), None);
    }

    #[test]
    fn detection_serializes_with_wire_names() {
        let det = Detection {
            class: "bottle".into(),
            confidence: 0.75,
            bbox: [1.0, 2.0, 3.0, 4.0],
        };
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["class"], "bottle");
        assert_eq!(value["confidence"], 0.75);
        assert_eq!(value["box"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
    }
}
