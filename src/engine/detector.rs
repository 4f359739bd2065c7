//! SCRFD Face Detector
//!
//! Runs the InsightFace SCRFD network over a letterboxed frame and turns its
//! per-stride score / distance outputs into face boxes in image coordinates.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use openvino::InferRequest;

use super::infer::{read_output, run_inference};
use super::pool::{ModelKind, ModelPool};
use super::preprocess::{prepare_detector_input, Letterbox, DETECTOR_INPUT_SIZE};

/// Detected face in original image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Output layout, derived from how many tensors the network exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout {
    strides: &'static [u32],
    anchors_per_cell: usize,
}

impl OutputLayout {
    /// Scores, boxes and optionally keypoints per stride:
    /// 6/9 outputs for the 3-stride models, 10/15 for the 5-stride ones.
    fn from_output_count(count: usize) -> Option<Self> {
        match count {
            6 | 9 => Some(Self {
                strides: &[8, 16, 32],
                anchors_per_cell: 2,
            }),
            10 | 15 => Some(Self {
                strides: &[8, 16, 32, 64, 128],
                anchors_per_cell: 1,
            }),
            _ => None,
        }
    }
}

pub struct FaceDetector {
    pool: Arc<ModelPool>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(pool: Arc<ModelPool>, confidence_threshold: f32, nms_threshold: f32) -> Self {
        Self {
            pool,
            confidence_threshold,
            nms_threshold,
        }
    }

    /// Detect faces, sorted by descending confidence
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (input, letterbox) = prepare_detector_input(image);
        let model = self.pool.get_model(ModelKind::Detector)?;
        let request = run_inference(&model, &input)?;

        let candidates = self.decode_outputs(&request, &letterbox)?;
        tracing::debug!("{} face candidates before NMS", candidates.len());

        let faces = non_max_suppression(candidates, self.nms_threshold);
        tracing::debug!("Detected {} faces", faces.len());
        Ok(faces)
    }

    fn decode_outputs(&self, request: &InferRequest, letterbox: &Letterbox) -> Result<Vec<FaceBox>> {
        let output_count = (0..16)
            .take_while(|&i| request.get_output_tensor_by_index(i).is_ok())
            .count();
        let layout = OutputLayout::from_output_count(output_count)
            .with_context(|| format!("unsupported SCRFD model with {} outputs", output_count))?;
        let fmc = layout.strides.len();

        let mut boxes = Vec::new();
        for (idx, &stride) in layout.strides.iter().enumerate() {
            let scores = read_output(&request.get_output_tensor_by_index(idx)?)?;
            let distances = read_output(&request.get_output_tensor_by_index(idx + fmc)?)?;
            boxes.extend(decode_stride(
                &scores,
                &distances,
                stride,
                layout.anchors_per_cell,
                self.confidence_threshold,
                letterbox,
            ));
        }
        Ok(boxes)
    }
}

/// Decode one stride level. Anchor centres walk the feature map row-major,
/// and `distances` holds (left, top, right, bottom) in stride units.
fn decode_stride(
    scores: &[f32],
    distances: &[f32],
    stride: u32,
    anchors_per_cell: usize,
    threshold: f32,
    letterbox: &Letterbox,
) -> Vec<FaceBox> {
    let (input_w, input_h) = DETECTOR_INPUT_SIZE;
    let feat_w = (input_w / stride) as usize;
    let feat_h = (input_h / stride) as usize;
    let step = stride as f32;

    let centres = (0..feat_h).flat_map(|y| {
        (0..feat_w).flat_map(move |x| {
            std::iter::repeat((x as f32 * step, y as f32 * step)).take(anchors_per_cell)
        })
    });

    centres
        .zip(scores.iter().copied())
        .zip(distances.chunks_exact(4))
        .filter(|((_, score), _)| *score >= threshold)
        .map(|(((cx, cy), score), d)| {
            let (x1, y1) = letterbox.to_original(cx - d[0] * step, cy - d[1] * step);
            let (x2, y2) = letterbox.to_original(cx + d[2] * step, cy + d[3] * step);
            FaceBox {
                x1,
                y1,
                x2,
                y2,
                confidence: score,
            }
        })
        .collect()
}

/// Greedy NMS; the result is ordered by descending confidence
pub fn non_max_suppression(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over union
pub fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let overlap = FaceBox {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        confidence: 0.0,
    };
    let intersection = overlap.area();
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
