//! YuNet face detector via ONNX Runtime — the fast backend.
//!
//! Lightweight anchor-free detector from the OpenCV model zoo. Accepts any
//! input size that is a multiple of 32, so the same model serves both the
//! quick single-face pass over the guest's own photo and the wider gallery pass.

use crate::detector::{
    clip_to_image, letterbox_tensor, nms, sort_by_confidence, DetectOptions, DetectorError,
    Letterbox, Normalization,
};
use crate::types::BoundingBox;
use image::RgbImage;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// YuNet was trained on OpenCV blobs: BGR, 0–255, no mean subtraction.
const YUNET_NORMALIZATION: Normalization = Normalization {
    mean: 0.0,
    std: 1.0,
    bgr: true,
};
const YUNET_NMS_THRESHOLD: f32 = 0.3;
const YUNET_STRIDES: [usize; 3] = [8, 16, 32];

/// YuNet-based face detector.
pub struct YuNetDetector {
    session: Session,
}

impl YuNetDetector {
    /// Load the YuNet ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let outputs: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        for stride in YUNET_STRIDES {
            for head in ["cls", "obj", "bbox", "kps"] {
                let name = format!("{head}_{stride}");
                if !outputs.contains(&name) {
                    return Err(DetectorError::InferenceFailed(format!(
                        "YuNet model is missing output tensor {name}"
                    )));
                }
            }
        }

        tracing::info!(path = %model_path.display(), "loaded YuNet model");
        Ok(Self { session })
    }

    /// Detect faces in an RGB image, returning boxes sorted by confidence.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        options: &DetectOptions,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let size = options.network_size();
        let (input, letterbox) = letterbox_tensor(image, size, YUNET_NORMALIZATION)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for stride in YUNET_STRIDES {
            let extract = |head: &str| {
                let name = format!("{head}_{stride}");
                outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{name}: {e}")))
            };
            let heads = YuNetHeads {
                cls: extract("cls")?,
                obj: extract("obj")?,
                bbox: extract("bbox")?,
                kps: extract("kps")?,
            };
            candidates.extend(decode_stride(&heads, stride, size, &letterbox, options.min_confidence));
        }

        let (width, height) = image.dimensions();
        let mut faces: Vec<BoundingBox> = nms(candidates, YUNET_NMS_THRESHOLD)
            .into_iter()
            .filter_map(|b| clip_to_image(b, width, height))
            .collect();
        sort_by_confidence(&mut faces);

        tracing::trace!(faces = faces.len(), size, "YuNet detect");
        Ok(faces)
    }
}

/// Raw head outputs for one stride level.
struct YuNetHeads<'a> {
    cls: &'a [f32],
    obj: &'a [f32],
    bbox: &'a [f32],
    kps: &'a [f32],
}

/// Decode one stride level.
///
/// Score is the geometric mean of the (already sigmoid-activated) class and
/// objectness heads. Box centers are offsets from the grid cell in stride
/// units, sizes are log-scaled.
fn decode_stride(
    heads: &YuNetHeads<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let s = stride as f32;
    let mut detections = Vec::new();

    for idx in 0..grid * grid {
        let cls = heads.cls.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        let obj = heads.obj.get(idx).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        let score = (cls * obj).sqrt();
        if score <= threshold {
            continue;
        }

        let col = (idx % grid) as f32;
        let row = (idx / grid) as f32;

        let Some(b) = heads.bbox.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let cx = (col + b[0]) * s;
        let cy = (row + b[1]) * s;
        let w = b[2].exp() * s;
        let h = b[3].exp() * s;

        let (x1, y1) = letterbox.to_image(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_image(cx + w / 2.0, cy + h / 2.0);

        let landmarks = heads.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| letterbox.to_image((k[i * 2] + col) * s, (k[i * 2 + 1] + row) * s))
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}
