use crate::config::OutputFormat;
use crate::detection::Detection;
use ndarray::ArrayViewD;

/// Maps model input coordinates back to the source image.
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformParams {
    /// Undo the letterbox and clip to the source image.
    #[inline]
    fn to_original(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> (f32, f32, f32, f32) {
        let w = self.orig_width as f32;
        let h = self.orig_height as f32;
        (
            ((x1 - self.offset_x) / self.scale).clamp(0.0, w),
            ((y1 - self.offset_y) / self.scale).clamp(0.0, h),
            ((x2 - self.offset_x) / self.scale).clamp(0.0, w),
            ((y2 - self.offset_y) / self.scale).clamp(0.0, h),
        )
    }
}

/// Concrete tensor layout after resolving [`OutputFormat::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    AnchorMajor { num_classes: usize, num_anchors: usize },
    Objectness { num_classes: usize, num_rows: usize },
    EndToEnd { num_rows: usize },
}

impl OutputLayout {
    pub fn resolve(shape: &[usize], format: OutputFormat) -> anyhow::Result<Self> {
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Expected a [1, _, _] prediction tensor, got {:?}", shape);
        }
        let (rows, cols) = (shape[1], shape[2]);

        let format = match format {
            OutputFormat::Auto if rows <= cols => OutputFormat::AnchorMajor,
            OutputFormat::Auto if cols == 6 => OutputFormat::EndToEnd,
            OutputFormat::Auto => OutputFormat::Objectness,
            explicit => explicit,
        };

        let layout = match format {
            OutputFormat::AnchorMajor if rows > 4 => OutputLayout::AnchorMajor {
                num_classes: rows - 4,
                num_anchors: cols,
            },
            OutputFormat::Objectness if cols > 5 => OutputLayout::Objectness {
                num_classes: cols - 5,
                num_rows: rows,
            },
            OutputFormat::EndToEnd if cols >= 6 => OutputLayout::EndToEnd { num_rows: rows },
            _ => anyhow::bail!(
                "Prediction tensor {:?} does not match the {:?} layout",
                shape,
                format
            ),
        };

        Ok(layout)
    }
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub output_format: OutputFormat,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
            output_format: OutputFormat::Auto,
        }
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Decode raw YOLO predictions into boxes on the original image.
    #[tracing::instrument(skip_all, fields(shape = ?predictions.shape()))]
    pub fn parse_detections(
        &self,
        predictions: &ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<Detection>> {
        let layout = OutputLayout::resolve(predictions.shape(), self.output_format)?;

        let candidates = match layout {
            OutputLayout::AnchorMajor {
                num_classes,
                num_anchors,
            } => self.decode_anchor_major(predictions, num_classes, num_anchors, transform),
            OutputLayout::Objectness {
                num_classes,
                num_rows,
            } => self.decode_objectness(predictions, num_classes, num_rows, transform),
            OutputLayout::EndToEnd { num_rows } => {
                let mut detections = self.decode_end_to_end(predictions, num_rows, transform);
                sort_by_confidence(&mut detections);
                detections.truncate(self.max_detections);
                return Ok(detections);
            }
        };

        tracing::trace!(candidates = candidates.len(), "Candidates above threshold");

        Ok(non_maximum_suppression(
            candidates,
            self.iou_threshold,
            self.max_detections,
        ))
    }

    fn decode_anchor_major(
        &self,
        predictions: &ArrayViewD<f32>,
        num_classes: usize,
        num_anchors: usize,
        transform: &TransformParams,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..num_anchors {
            let (class_idx, confidence) =
                argmax((0..num_classes).map(|c| predictions[[0, 4 + c, i]]));

            if confidence < self.confidence_threshold {
                continue;
            }

            let cx = predictions[[0, 0, i]];
            let cy = predictions[[0, 1, i]];
            let w = predictions[[0, 2, i]];
            let h = predictions[[0, 3, i]];

            detections.push(self.build(cx, cy, w, h, confidence, class_idx, transform));
        }

        detections
    }

    fn decode_objectness(
        &self,
        predictions: &ArrayViewD<f32>,
        num_classes: usize,
        num_rows: usize,
        transform: &TransformParams,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..num_rows {
            let objectness = predictions[[0, i, 4]];
            if objectness < self.confidence_threshold {
                continue;
            }

            let (class_idx, class_score) =
                argmax((0..num_classes).map(|c| predictions[[0, i, 5 + c]]));
            let confidence = objectness * class_score;

            if confidence < self.confidence_threshold {
                continue;
            }

            let cx = predictions[[0, i, 0]];
            let cy = predictions[[0, i, 1]];
            let w = predictions[[0, i, 2]];
            let h = predictions[[0, i, 3]];

            detections.push(self.build(cx, cy, w, h, confidence, class_idx, transform));
        }

        detections
    }

    fn decode_end_to_end(
        &self,
        predictions: &ArrayViewD<f32>,
        num_rows: usize,
        transform: &TransformParams,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..num_rows {
            let confidence = predictions[[0, i, 4]];
            if confidence < self.confidence_threshold {
                continue;
            }

            let (x1, y1, x2, y2) = transform.to_original(
                predictions[[0, i, 0]],
                predictions[[0, i, 1]],
                predictions[[0, i, 2]],
                predictions[[0, i, 3]],
            );

            detections.push(Detection {
                x1,
                y1,
                x2,
                y2,
                confidence,
                class_id: predictions[[0, i, 5]].max(0.0).round() as u32,
            });
        }

        detections
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        confidence: f32,
        class_idx: usize,
        transform: &TransformParams,
    ) -> Detection {
        let (x1, y1, x2, y2) = cxcywh_to_xyxy(cx, cy, w, h);
        let (x1, y1, x2, y2) = transform.to_original(x1, y1, x2, y2);

        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: class_idx as u32,
        }
    }
}

/// Class-aware greedy NMS. Output is sorted by confidence, highest first.
pub fn non_maximum_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    sort_by_confidence(&mut candidates);

    let mut kept: Vec<Detection> = Vec::new();

    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }

        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);

        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// Index and value of the largest element; `(0, -inf)` when empty.
#[inline]
fn argmax(values: impl Iterator<Item = f32>) -> (usize, f32) {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
