//! 68-point facial landmark model via ONNX Runtime.
//!
//! Runs a PFLD-style regressor on a square crop around each detected face and
//! reduces the 68 iBUG points to the five points used for alignment.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 112;
const LANDMARK_POINTS: usize = 68;
/// Crop side relative to the longer box side; the regressor expects some context.
const CROP_EXPANSION: f32 = 1.2;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0} — place the landmark model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is empty")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 68 iBUG landmarks in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<(f32, f32)>,
}

impl FaceLandmarks {
    /// Reduce to [left_eye, right_eye, nose, left_mouth, right_mouth] as seen in the image.
    ///
    /// Eye positions are the centroids of their six contour points.
    pub fn alignment_points(&self) -> Option<[(f32, f32); 5]> {
        if self.points.len() < LANDMARK_POINTS {
            return None;
        }
        let centroid = |range: std::ops::Range<usize>| {
            let n = range.len() as f32;
            let (sx, sy) = self.points[range]
                .iter()
                .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        Some([
            centroid(36..42),
            centroid(42..48),
            self.points[30],
            self.points[48],
            self.points[54],
        ])
    }
}

/// Square crop window in source-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropWindow {
    x: u32,
    y: u32,
    size: u32,
}

/// 68-point landmark regressor.
pub struct LandmarkModel {
    session: Session,
    /// Some exports emit an auxiliary pose head first; the landmark head is the last output.
    landmark_output: usize,
}

impl LandmarkModel {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let landmark_output = session
            .outputs()
            .len()
            .checked_sub(1)
            .ok_or_else(|| LandmarkError::InferenceFailed("landmark model has no outputs".into()))?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self {
            session,
            landmark_output,
        })
    }

    /// Locate the 68 landmarks of one detected face.
    pub fn locate(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FaceLandmarks, LandmarkError> {
        let window = crop_window(face, image.width(), image.height()).ok_or(LandmarkError::EmptyCrop)?;
        let crop = image::imageops::crop_imm(image, window.x, window.y, window.size, window.size).to_image();
        let resized = image::imageops::resize(&crop, LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE, FilterType::Triangle);
        let input = Self::preprocess(&resized);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[self.landmark_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        to_image_points(raw, window)
    }

    /// Convert an RGB crop into a NCHW tensor scaled to [0, 1].
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = LANDMARK_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

/// Square window centered on the face, expanded and clamped to the image.
fn crop_window(face: &BoundingBox, width: u32, height: u32) -> Option<CropWindow> {
    if width == 0 || height == 0 {
        return None;
    }
    let side = (face.width.max(face.height) * CROP_EXPANSION).round() as i64;
    let side = side.min(width.min(height) as i64);
    if side < 2 {
        return None;
    }
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let x = ((cx - side as f32 / 2.0).round() as i64).clamp(0, width as i64 - side);
    let y = ((cy - side as f32 / 2.0).round() as i64).clamp(0, height as i64 - side);
    Some(CropWindow {
        x: x as u32,
        y: y as u32,
        size: side as u32,
    })
}

/// Map normalized crop coordinates back to image space.
fn to_image_points(raw: &[f32], window: CropWindow) -> Result<FaceLandmarks, LandmarkError> {
    if raw.len() < LANDMARK_POINTS * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            LANDMARK_POINTS * 2,
            raw.len()
        )));
    }
    let size = window.size as f32;
    let points = raw[..LANDMARK_POINTS * 2]
        .chunks_exact(2)
        .map(|p| (window.x as f32 + p[0] * size, window.y as f32 + p[1] * size))
        .collect();
    Ok(FaceLandmarks { points })
}
