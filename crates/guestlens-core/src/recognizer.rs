//! SFace face recognizer via ONNX Runtime.
//!
//! Extracts 128-dimensional face embeddings from aligned 112×112 crops.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SFACE_MODEL_VERSION: &str = "sface_2021dec";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — place the recognition model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// SFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the SFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SFace model"
        );

        Ok(Self { session })
    }

    /// Align the face described by `landmarks` and extract its embedding.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        landmarks: &[(f32, f32); 5],
    ) -> Result<Embedding, RecognizerError> {
        let aligned = alignment::align_face(image, landmarks);
        let input = Self::preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values = l2_normalize(raw)?;
        Ok(Embedding {
            values,
            model_version: Some(SFACE_MODEL_VERSION.to_string()),
        })
    }

    /// RGB crop → NCHW tensor. SFace takes raw 0–255 values.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ALIGNED_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32;
            }
        }
        tensor
    }
}

/// Check the dimension and scale to unit length.
fn l2_normalize(raw: &[f32]) -> Result<Vec<f32>, RecognizerError> {
    if raw.len() != EMBEDDING_DIM {
        return Err(RecognizerError::InferenceFailed(format!(
            "expected {EMBEDDING_DIM}-dim embedding, got {}",
            raw.len()
        )));
    }
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    Ok(if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_output_shape() {
        let aligned = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
        let tensor = FaceRecognizer::preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_keeps_rgb_order() {
        let aligned = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([200, 100, 50]));
        let tensor = FaceRecognizer::preprocess(&aligned);
        assert_eq!(tensor[[0, 0, 3, 7]], 200.0);
        assert_eq!(tensor[[0, 1, 3, 7]], 100.0);
        assert_eq!(tensor[[0, 2, 3, 7]], 50.0);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let mut raw = vec![0.0f32; EMBEDDING_DIM];
        raw[0] = 3.0;
        raw[1] = 4.0;
        let values = l2_normalize(&raw).unwrap();
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((values[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_rejects_wrong_dimension() {
        let raw = vec![1.0f32; 512];
        assert!(matches!(l2_normalize(&raw), Err(RecognizerError::InferenceFailed(_))));
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let raw = vec![0.0f32; EMBEDDING_DIM];
        assert_eq!(l2_normalize(&raw).unwrap(), raw);
    }
}
