use crate::labels::ClassNames;
use serde::{Deserialize, Serialize};

/// A detected object in original image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection(&self, other: &Detection) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Divide coordinates by the image size so they land in `0.0..=1.0`.
    pub fn normalized(&self, width: u32, height: u32, names: &ClassNames) -> NormalizedBox {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        NormalizedBox {
            x1: self.x1 / w,
            y1: self.y1 / h,
            x2: self.x2 / w,
            y2: self.y2 / h,
            confidence: self.confidence,
            label: names.label(self.class_id),
            class_id: self.class_id,
        }
    }
}

/// Wire form of a detection: unit coordinates plus a readable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub label: String,
    pub class_id: u32,
}

/// Body of a detection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<NormalizedBox>,
}

impl DetectionReport {
    pub fn new(width: u32, height: u32, detections: &[Detection], names: &ClassNames) -> Self {
        Self {
            width,
            height,
            boxes: detections
                .iter()
                .map(|d| d.normalized(width, height, names))
                .collect(),
        }
    }
}
