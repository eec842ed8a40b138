//! Detector backends and the preprocessing they share.
//!
//! Two backends are available: a fast low-resolution YuNet detector and a
//! high-accuracy SCRFD detector that copes better with tilted and small faces.
//! Both take a letterboxed NCHW tensor and return boxes in image coordinates.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — place the detector model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image has no pixels ({0}x{1})")]
    EmptyImage(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Which detector produced a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// YuNet: fast, good with small frontal faces.
    Fast,
    /// SCRFD: slower, better across angles and scales.
    Accurate,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Fast => "fast",
            BackendKind::Accurate => "accurate",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-invocation detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectOptions {
    /// Side of the square network input, rounded up to a multiple of 32.
    pub input_size: usize,
    /// Detections scoring at or below this are dropped.
    pub min_confidence: f32,
}

impl DetectOptions {
    pub const fn new(input_size: usize, min_confidence: f32) -> Self {
        Self {
            input_size,
            min_confidence,
        }
    }

    /// Input size snapped to the detectors' 32-pixel stride grid.
    pub fn network_size(&self) -> usize {
        self.input_size.max(32).div_ceil(32) * 32
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from network input space back to the source image.
    pub fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Pixel normalization applied while building the input tensor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Normalization {
    pub mean: f32,
    pub std: f32,
    /// Feed channels as B, G, R instead of R, G, B.
    pub bgr: bool,
}

/// Letterbox an RGB image into a `size`×`size` NCHW float tensor.
///
/// The image is scaled to fit and centered; padding is 0.0 after
/// normalization, i.e. a `norm.mean` pixel.
pub(crate) fn letterbox_tensor(
    image: &RgbImage,
    size: usize,
    norm: Normalization,
) -> Result<(Array4<f32>, Letterbox), DetectorError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectorError::EmptyImage(width, height));
    }

    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size as u32);
    let pad_x = (size as u32 - new_w) as f32 / 2.0;
    let pad_y = (size as u32 - new_h) as f32 / 2.0;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let x0 = pad_x.floor() as usize;
    let y0 = pad_y.floor() as usize;

    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (c0, c2) = if norm.bgr { (b, r) } else { (r, b) };
        let tx = x0 + x as usize;
        let ty = y0 + y as usize;
        tensor[[0, 0, ty, tx]] = (c0 as f32 - norm.mean) / norm.std;
        tensor[[0, 1, ty, tx]] = (g as f32 - norm.mean) / norm.std;
        tensor[[0, 2, ty, tx]] = (c2 as f32 - norm.mean) / norm.std;
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x: x0 as f32,
            pad_y: y0 as f32,
        },
    ))
}

/// Sort detections by descending confidence.
pub(crate) fn sort_by_confidence(detections: &mut [BoundingBox]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Non-Maximum Suppression: remove overlapping detections, highest confidence first.
pub(crate) fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    sort_by_confidence(&mut detections);

    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two bounding boxes.
pub(crate) fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

/// Clip a box to the image bounds. Returns `None` when nothing is left.
pub(crate) fn clip_to_image(mut bbox: BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let x1 = bbox.x.clamp(0.0, width as f32);
    let y1 = bbox.y.clamp(0.0, height as f32);
    let x2 = (bbox.x + bbox.width).clamp(0.0, width as f32);
    let y2 = (bbox.y + bbox.height).clamp(0.0, height as f32);
    if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
        return None;
    }
    bbox.x = x1;
    bbox.y = y1;
    bbox.width = x2 - x1;
    bbox.height = y2 - y1;
    Some(bbox)
}
