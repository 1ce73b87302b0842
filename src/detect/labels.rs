use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Class names of the COCO dataset, the label table of stock YOLOv8 weights.
const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Maps model class indices to human-readable names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_LABELS.iter().map(|name| name.to_string()).collect())
    }

    /// Load one label per line. Blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let names: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(anyhow!("labels file {} has no labels", path.display()));
        }
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for `class_id`; unknown indices become `class_<id>`.
    pub fn resolve(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_table_resolves_known_classes() {
        let labels = LabelTable::coco();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.resolve(0), "person");
        assert_eq!(labels.resolve(39), "bottle");
        assert_eq!(labels.resolve(79), "toothbrush");
    }

    #[test]
    fn unknown_class_falls_back_to_index() {
        let labels = LabelTable::coco();
        assert_eq!(labels.resolve(80), "class_80");
    }

    #[test]
    fn loads_labels_file_skipping_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "plastic\n\n  can  \nglass").unwrap();
        let labels = LabelTable::from_file(file.path()).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.resolve(1), "can");
    }

    #[test]
    fn empty_labels_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(LabelTable::from_file(file.path()).is_err());
    }
}
